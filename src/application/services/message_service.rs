//! Message Service
//!
//! Validated message creation, read receipts, delivery status and edits.
//! Authorization against rooms and private chats is delegated to their
//! services.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::private_chat_service::{PrivateChatError, PrivateChatService};
use super::room_service::{RoomError, RoomService};
use crate::application::pagination::PageRequest;
use crate::config::MessagingSettings;
use crate::domain::{Message, MessageRepository, MessageTarget, MessageType};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, ErrorKind};
use crate::shared::snowflake::SnowflakeGenerator;

/// A chronological page of history.
///
/// `has_more` is true whenever the page came back full, so it over-reports
/// when the last page is exactly `limit` long.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub page: i64,
    pub limit: i64,
}

impl MessageHistory {
    pub fn from_newest_first(mut messages: Vec<Message>, page: PageRequest) -> Self {
        let has_more = messages.len() as i64 == page.limit;
        messages.reverse();
        Self {
            messages,
            has_more,
            page: page.page,
            limit: page.limit,
        }
    }
}

/// Outcome of a read acknowledgement.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub message: Message,
    /// False when the reader had already read it, or wrote it.
    pub newly_read: bool,
}

/// Message service trait
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Validate and persist a message, then move the destination's
    /// last-message pointer and activity timestamp.
    async fn send(
        &self,
        author_id: i64,
        target: MessageTarget,
        content: &str,
        message_type: MessageType,
        reply_to: Option<i64>,
    ) -> Result<Message, MessageError>;

    /// Record that `reader_id` read the message.
    async fn mark_read(&self, message_id: i64, reader_id: i64) -> Result<ReadOutcome, MessageError>;

    /// Advance `sent -> delivered`. Returns whether the status changed.
    async fn mark_delivered(&self, message_id: i64) -> Result<bool, MessageError>;

    /// Replace the content; author only.
    async fn edit(&self, message_id: i64, editor_id: i64, content: &str) -> Result<Message, MessageError>;

    /// Newest-first messages of a destination.
    async fn recent(&self, target: MessageTarget, limit: i64, offset: i64) -> Result<Vec<Message>, MessageError>;

    async fn get(&self, message_id: i64) -> Result<Message, MessageError>;
}

/// Message service errors
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message content cannot be empty")]
    Empty,

    #[error("Message cannot exceed {0} characters")]
    TooLong(usize),

    #[error("Message not found")]
    NotFound,

    #[error("Chat room or private chat not found")]
    DestinationNotFound,

    #[error("Not a participant of this conversation")]
    Forbidden,

    #[error("Private chat is no longer active")]
    InactiveChat,

    #[error("Reply must reference a message in the same conversation")]
    InvalidReply,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MessageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessageError::Empty | MessageError::TooLong(_) | MessageError::InvalidReply => {
                ErrorKind::ValidationFailed
            }
            MessageError::NotFound | MessageError::DestinationNotFound => ErrorKind::NotFound,
            MessageError::Forbidden => ErrorKind::Forbidden,
            MessageError::InactiveChat => ErrorKind::InvalidState,
            MessageError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<MessageError> for AppError {
    fn from(err: MessageError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}

impl From<RoomError> for MessageError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NotFound => MessageError::DestinationNotFound,
            RoomError::Forbidden | RoomError::NotMember => MessageError::Forbidden,
            other => MessageError::Internal(other.to_string()),
        }
    }
}

impl From<PrivateChatError> for MessageError {
    fn from(err: PrivateChatError) -> Self {
        match err {
            PrivateChatError::NotFound => MessageError::DestinationNotFound,
            PrivateChatError::Forbidden => MessageError::Forbidden,
            PrivateChatError::MessageNotFound => MessageError::NotFound,
            other => MessageError::Internal(other.to_string()),
        }
    }
}

/// MessageService implementation
pub struct MessageServiceImpl {
    message_repo: Arc<dyn MessageRepository>,
    rooms: Arc<dyn RoomService>,
    private_chats: Arc<dyn PrivateChatService>,
    id_generator: Arc<SnowflakeGenerator>,
    limits: MessagingSettings,
}

impl MessageServiceImpl {
    pub fn new(
        message_repo: Arc<dyn MessageRepository>,
        rooms: Arc<dyn RoomService>,
        private_chats: Arc<dyn PrivateChatService>,
        id_generator: Arc<SnowflakeGenerator>,
        limits: MessagingSettings,
    ) -> Self {
        Self {
            message_repo,
            rooms,
            private_chats,
            id_generator,
            limits,
        }
    }

    fn normalize<'a>(&self, content: &'a str) -> Result<&'a str, MessageError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessageError::Empty);
        }
        if content.chars().count() > self.limits.max_content_length {
            return Err(MessageError::TooLong(self.limits.max_content_length));
        }
        Ok(content)
    }

    async fn find(&self, message_id: i64) -> Result<Message, MessageError> {
        self.message_repo
            .find_by_id(message_id)
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))?
            .ok_or(MessageError::NotFound)
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn send(
        &self,
        author_id: i64,
        target: MessageTarget,
        content: &str,
        message_type: MessageType,
        reply_to: Option<i64>,
    ) -> Result<Message, MessageError> {
        let content = self.normalize(content)?;

        match target {
            MessageTarget::Room(room_id) => {
                self.rooms.get_participating(room_id, author_id).await?;
            }
            MessageTarget::PrivateChat(chat_id) => {
                let chat = self.private_chats.get_participating(chat_id, author_id).await?;
                if !chat.is_active {
                    return Err(MessageError::InactiveChat);
                }
            }
        }

        if let Some(reply_id) = reply_to {
            let parent = self
                .message_repo
                .find_by_id(reply_id)
                .await
                .map_err(|e| MessageError::Internal(e.to_string()))?;
            if parent.map_or(true, |p| p.target != target) {
                return Err(MessageError::InvalidReply);
            }
        }

        let message = Message::new(
            self.id_generator.generate(),
            author_id,
            target,
            content,
            message_type,
            reply_to,
        );
        let created = self
            .message_repo
            .create(&message)
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))?;

        match target {
            MessageTarget::Room(room_id) => {
                self.rooms.touch_activity(room_id, Some(created.id)).await?
            }
            MessageTarget::PrivateChat(chat_id) => {
                self.private_chats.record_activity(chat_id, created.id).await?
            }
        }

        metrics::record_message_sent(target.kind());
        debug!(
            message_id = created.id,
            user_id = author_id,
            destination = target.kind(),
            "Message sent"
        );
        Ok(created)
    }

    async fn mark_read(&self, message_id: i64, reader_id: i64) -> Result<ReadOutcome, MessageError> {
        let message = self.find(message_id).await?;

        let chat = match message.target {
            MessageTarget::Room(room_id) => {
                self.rooms.get_participating(room_id, reader_id).await?;
                None
            }
            MessageTarget::PrivateChat(chat_id) => {
                Some(self.private_chats.get_participating(chat_id, reader_id).await?)
            }
        };

        if message.sender_id == reader_id {
            return Ok(ReadOutcome {
                message,
                newly_read: false,
            });
        }

        let (message, newly_read) = self
            .message_repo
            .record_read(message_id, reader_id, Utc::now())
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))?
            .ok_or(MessageError::NotFound)?;

        if let Some(chat) = chat {
            let current = chat
                .cursor_for(reader_id)
                .and_then(|cursor| cursor.last_read_message_id);
            if current.map_or(true, |read| message.id > read) {
                self.private_chats
                    .mark_read(chat.id, reader_id, Some(message.id))
                    .await?;
            }
        }

        Ok(ReadOutcome { message, newly_read })
    }

    async fn mark_delivered(&self, message_id: i64) -> Result<bool, MessageError> {
        self.message_repo
            .mark_delivered(message_id)
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))
    }

    async fn edit(&self, message_id: i64, editor_id: i64, content: &str) -> Result<Message, MessageError> {
        let content = self.normalize(content)?;
        let message = self.find(message_id).await?;
        if message.sender_id != editor_id {
            return Err(MessageError::Forbidden);
        }

        let edited = self
            .message_repo
            .update_content(message_id, content, Utc::now())
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))?
            .ok_or(MessageError::NotFound)?;

        info!(message_id, user_id = editor_id, "Message edited");
        Ok(edited)
    }

    async fn recent(&self, target: MessageTarget, limit: i64, offset: i64) -> Result<Vec<Message>, MessageError> {
        self.message_repo
            .find_by_target(target, limit, offset)
            .await
            .map_err(|e| MessageError::Internal(e.to_string()))
    }

    async fn get(&self, message_id: i64) -> Result<Message, MessageError> {
        self.find(message_id).await
    }
}
