//! Response DTOs
//!
//! Data structures for API response bodies and gateway event payloads.

use serde::Serialize;

use crate::application::pagination::{Page, Pagination};
use crate::application::services::{
    FriendRequestView, FriendResponse, MessageHistory, PrivateChatSummary,
};
use crate::domain::{ChatRoom, FriendRequest, Message, Participant, PrivateChat, User};

/// User response
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_online: bool,
    pub last_seen: String,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: User, include_email: bool) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: if include_email { Some(user.email) } else { None },
            is_online: user.is_online,
            last_seen: user.last_seen.to_rfc3339(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Registration response (includes user and token)
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Friend request response
#[derive(Debug, Clone, Serialize)]
pub struct FriendRequestResponse {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub message: String,
    pub responded_at: Option<String>,
    pub created_at: String,
    /// The user on the other side, when listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

impl From<FriendRequest> for FriendRequestResponse {
    fn from(request: FriendRequest) -> Self {
        Self {
            id: request.id.to_string(),
            sender_id: request.sender_id.to_string(),
            receiver_id: request.receiver_id.to_string(),
            status: request.status.as_str().to_string(),
            message: request.message,
            responded_at: request.responded_at.map(|t| t.to_rfc3339()),
            created_at: request.created_at.to_rfc3339(),
            user: None,
        }
    }
}

impl From<FriendRequestView> for FriendRequestResponse {
    fn from(view: FriendRequestView) -> Self {
        Self {
            user: view.counterpart.map(|u| UserResponse::from_user(u, false)),
            ..Self::from(view.request)
        }
    }
}

/// Answer to accept/decline
#[derive(Debug, Serialize)]
pub struct FriendDecisionResponse {
    pub request: FriendRequestResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<PrivateChatResponse>,
}

impl From<FriendResponse> for FriendDecisionResponse {
    fn from(response: FriendResponse) -> Self {
        Self {
            request: response.request.into(),
            chat: response.chat.map(PrivateChatResponse::from),
        }
    }
}

/// Paged friend requests
#[derive(Debug, Serialize)]
pub struct FriendRequestListResponse {
    pub requests: Vec<FriendRequestResponse>,
    pub pagination: Pagination,
}

impl From<Page<FriendRequestView>> for FriendRequestListResponse {
    fn from(page: Page<FriendRequestView>) -> Self {
        Self {
            requests: page.items.into_iter().map(Into::into).collect(),
            pagination: page.pagination,
        }
    }
}

/// Paged friends
#[derive(Debug, Serialize)]
pub struct FriendListResponse {
    pub friends: Vec<UserResponse>,
    pub pagination: Pagination,
}

impl From<Page<User>> for FriendListResponse {
    fn from(page: Page<User>) -> Self {
        Self {
            friends: page
                .items
                .into_iter()
                .map(|u| UserResponse::from_user(u, true))
                .collect(),
            pagination: page.pagination,
        }
    }
}

/// Room participant response
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
}

impl From<Participant> for ParticipantResponse {
    fn from(participant: Participant) -> Self {
        Self {
            user_id: participant.user_id.to_string(),
            role: participant.role.as_str().to_string(),
            joined_at: participant.joined_at.to_rfc3339(),
        }
    }
}

/// Room response
#[derive(Debug, Clone, Serialize)]
pub struct RoomResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    pub participants: Vec<ParticipantResponse>,
    pub created_by: String,
    pub last_message_id: Option<String>,
    pub last_activity: String,
    pub created_at: String,
}

impl From<ChatRoom> for RoomResponse {
    fn from(room: ChatRoom) -> Self {
        Self {
            id: room.id.to_string(),
            name: room.name,
            description: room.description,
            visibility: room.visibility.as_str().to_string(),
            participants: room.participants.into_iter().map(Into::into).collect(),
            created_by: room.created_by.to_string(),
            last_message_id: room.last_message_id.map(|id| id.to_string()),
            last_activity: room.last_activity.to_rfc3339(),
            created_at: room.created_at.to_rfc3339(),
        }
    }
}

/// Read receipt response
#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptResponse {
    pub user_id: String,
    pub read_at: String,
}

/// Message response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub room_id: Option<String>,
    pub private_chat_id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub delivery_status: String,
    pub read_by: Vec<ReadReceiptResponse>,
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            content: message.content,
            sender_id: message.sender_id.to_string(),
            room_id: message.target.room_id().map(|id| id.to_string()),
            private_chat_id: message.target.private_chat_id().map(|id| id.to_string()),
            message_type: message.message_type.as_str().to_string(),
            delivery_status: message.delivery_status.as_str().to_string(),
            read_by: message
                .read_by
                .into_iter()
                .map(|r| ReadReceiptResponse {
                    user_id: r.user_id.to_string(),
                    read_at: r.read_at.to_rfc3339(),
                })
                .collect(),
            reply_to: message.reply_to_id.map(|id| id.to_string()),
            is_edited: message.is_edited,
            edited_at: message.edited_at.map(|t| t.to_rfc3339()),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Chronological message page
#[derive(Debug, Serialize)]
pub struct MessageHistoryResponse {
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
    pub page: i64,
    pub limit: i64,
}

impl From<MessageHistory> for MessageHistoryResponse {
    fn from(history: MessageHistory) -> Self {
        Self {
            messages: history.messages.into_iter().map(Into::into).collect(),
            has_more: history.has_more,
            page: history.page,
            limit: history.limit,
        }
    }
}

/// Private chat response
#[derive(Debug, Clone, Serialize)]
pub struct PrivateChatResponse {
    pub id: String,
    pub participants: Vec<String>,
    pub last_message_id: Option<String>,
    pub last_activity: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
}

impl From<PrivateChat> for PrivateChatResponse {
    fn from(chat: PrivateChat) -> Self {
        Self {
            id: chat.id.to_string(),
            participants: chat
                .participants
                .members()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            last_message_id: chat.last_message_id.map(|id| id.to_string()),
            last_activity: chat.last_activity.to_rfc3339(),
            is_active: chat.is_active,
            created_by: chat.created_by.to_string(),
            created_at: chat.created_at.to_rfc3339(),
        }
    }
}

/// Private chat seen by one participant
#[derive(Debug, Serialize)]
pub struct PrivateChatSummaryResponse {
    #[serde(flatten)]
    pub chat: PrivateChatResponse,
    pub other_participant: Option<UserResponse>,
    pub unread_count: i64,
    pub last_message: Option<MessageResponse>,
}

impl From<PrivateChatSummary> for PrivateChatSummaryResponse {
    fn from(summary: PrivateChatSummary) -> Self {
        Self {
            chat: summary.chat.into(),
            other_participant: summary
                .other_participant
                .map(|u| UserResponse::from_user(u, false)),
            unread_count: summary.unread_count,
            last_message: summary.last_message.map(Into::into),
        }
    }
}

/// Paged private chats
#[derive(Debug, Serialize)]
pub struct PrivateChatListResponse {
    pub chats: Vec<PrivateChatSummaryResponse>,
    pub pagination: Pagination,
}

impl From<Page<PrivateChatSummary>> for PrivateChatListResponse {
    fn from(page: Page<PrivateChatSummary>) -> Self {
        Self {
            chats: page.items.into_iter().map(Into::into).collect(),
            pagination: page.pagination,
        }
    }
}

/// Read acknowledgement response
#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub message: MessageResponse,
    pub newly_read: bool,
}
