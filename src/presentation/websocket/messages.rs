//! WebSocket Message Types
//!
//! Client intents arrive as `{"type": "<intent>", "data": {...}}`; server
//! events leave as `{"event": "<name>", "data": {...}}`. Ids may be sent as
//! strings or numbers and always go out as strings.

use serde::{Deserialize, Deserializer, Serialize};

use crate::application::dto::response::{FriendRequestResponse, MessageResponse, UserResponse};
use crate::shared::error::ErrorKind;

/// Incoming intent
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientIntent {
    JoinRoom(RoomPayload),
    LeaveRoom(RoomPayload),
    SendMessage(SendMessagePayload),
    SendPrivateMessage(SendPrivateMessagePayload),
    MarkMessageRead(MarkReadPayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    JoinPrivateChat(PrivateChatPayload),
    FriendRequestSent(FriendRequestPayload),
    FriendRequestResponded(FriendRequestPayload),
}

impl ClientIntent {
    /// Wire name, echoed back in error events
    pub fn name(&self) -> &'static str {
        match self {
            ClientIntent::JoinRoom(_) => "joinRoom",
            ClientIntent::LeaveRoom(_) => "leaveRoom",
            ClientIntent::SendMessage(_) => "sendMessage",
            ClientIntent::SendPrivateMessage(_) => "sendPrivateMessage",
            ClientIntent::MarkMessageRead(_) => "markMessageRead",
            ClientIntent::TypingStart(_) => "typingStart",
            ClientIntent::TypingStop(_) => "typingStop",
            ClientIntent::JoinPrivateChat(_) => "joinPrivateChat",
            ClientIntent::FriendRequestSent(_) => "friendRequestSent",
            ClientIntent::FriendRequestResponded(_) => "friendRequestResponded",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub room_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateChatPayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub room_id: i64,
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPrivateMessagePayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub chat_id: i64,
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub message_id: i64,
}

/// Exactly one of `room_id` / `chat_id` is expected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub room_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub chat_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestPayload {
    #[serde(deserialize_with = "flexible_id::required")]
    pub request_id: i64,
}

mod flexible_id {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    impl RawId {
        fn parse<E: serde::de::Error>(self) -> Result<i64, E> {
            match self {
                RawId::Number(n) => Ok(n),
                RawId::Text(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("invalid id: {s:?}"))),
            }
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        RawId::deserialize(d)?.parse()
    }

    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Option::<RawId>::deserialize(d)?
            .map(RawId::parse)
            .transpose()
    }
}

/// Outgoing event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
    /// Sent to a connection once it is bound
    UserRooms { room_ids: Vec<String> },
    OnlineUsers { users: Vec<UserResponse> },
    JoinedRoom { room_id: String },
    LeftRoom { room_id: String },
    JoinedPrivateChat { chat_id: String },
    UserJoinedRoom(RoomPresencePayload),
    UserLeftRoom(RoomPresencePayload),
    NewMessage(MessageResponse),
    NewPrivateMessage(MessageResponse),
    MessageEdited(MessageResponse),
    MessageRead(MessageReadPayload),
    PrivateMessageNotification(PrivateMessageNotificationPayload),
    UserTyping(UserTypingPayload),
    UserStopTyping(UserTypingPayload),
    FriendRequestReceived(FriendRequestReceivedPayload),
    FriendRequestResponse(FriendRequestResponsePayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>, intent: Option<&str>) -> Self {
        ServerEvent::Error(ErrorPayload {
            kind,
            message: message.into(),
            intent: intent.map(str::to_string),
        })
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnline(_) => "user_online",
            ServerEvent::UserOffline(_) => "user_offline",
            ServerEvent::UserRooms { .. } => "user_rooms",
            ServerEvent::OnlineUsers { .. } => "online_users",
            ServerEvent::JoinedRoom { .. } => "joined_room",
            ServerEvent::LeftRoom { .. } => "left_room",
            ServerEvent::JoinedPrivateChat { .. } => "joined_private_chat",
            ServerEvent::UserJoinedRoom(_) => "user_joined_room",
            ServerEvent::UserLeftRoom(_) => "user_left_room",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::NewPrivateMessage(_) => "new_private_message",
            ServerEvent::MessageEdited(_) => "message_edited",
            ServerEvent::MessageRead(_) => "message_read",
            ServerEvent::PrivateMessageNotification(_) => "private_message_notification",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
            ServerEvent::FriendRequestReceived(_) => "friend_request_received",
            ServerEvent::FriendRequestResponse(_) => "friend_request_response",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresencePayload {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomPresencePayload {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReadPayload {
    pub message_id: String,
    pub read_by: String,
    pub read_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivateMessageNotificationPayload {
    pub chat_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub message_preview: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserTypingPayload {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendRequestReceivedPayload {
    pub friend_request: FriendRequestResponse,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendRequestResponsePayload {
    pub request_id: String,
    pub status: String,
    pub responder_id: String,
    pub responder_name: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}
