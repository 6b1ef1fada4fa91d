//! Private Chat Service
//!
//! Resolves the single active chat of a user pair, tracks read cursors and
//! computes unread counts.
//!
//! Unread counts compare `created_at` timestamps against the cursor
//! message's timestamp. Two messages sharing a timestamp can make the count
//! off by one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::message_service::MessageHistory;
use crate::application::pagination::{Page, PageRequest};
use crate::domain::{
    CanonicalPair, Message, MessageRepository, MessageTarget, PrivateChat, PrivateChatRepository,
    User, UserRepository,
};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, ErrorKind};
use crate::shared::snowflake::SnowflakeGenerator;

/// A chat as seen by one of its participants.
#[derive(Debug, Clone)]
pub struct PrivateChatSummary {
    pub chat: PrivateChat,
    pub other_participant: Option<User>,
    pub unread_count: i64,
    pub last_message: Option<Message>,
}

/// Private chat service trait
#[async_trait]
pub trait PrivateChatService: Send + Sync {
    /// Return the pair's active chat, creating it if there is none.
    async fn find_or_create(&self, user_a: i64, user_b: i64) -> Result<PrivateChat, PrivateChatError>;

    /// Load a chat the caller participates in.
    async fn get_participating(&self, chat_id: i64, user_id: i64) -> Result<PrivateChat, PrivateChatError>;

    /// Move the caller's cursor to `message_id`, or to the chat's last
    /// message when omitted.
    async fn mark_read(
        &self,
        chat_id: i64,
        user_id: i64,
        message_id: Option<i64>,
    ) -> Result<PrivateChat, PrivateChatError>;

    async fn unread_count(&self, chat_id: i64, user_id: i64) -> Result<i64, PrivateChatError>;

    /// Active chats of a user, most recently active first.
    async fn list_for_user(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Page<PrivateChatSummary>, PrivateChatError>;

    async fn details(&self, chat_id: i64, user_id: i64) -> Result<PrivateChatSummary, PrivateChatError>;

    /// A chronological page of history. Advances the caller's cursor to the
    /// newest message returned.
    async fn messages(
        &self,
        chat_id: i64,
        user_id: i64,
        page: PageRequest,
    ) -> Result<MessageHistory, PrivateChatError>;

    /// Deactivate a chat; history is kept.
    async fn deactivate(&self, chat_id: i64, user_id: i64) -> Result<PrivateChat, PrivateChatError>;

    /// Point the chat at its newest message.
    async fn record_activity(&self, chat_id: i64, message_id: i64) -> Result<(), PrivateChatError>;
}

/// The participant of `chat` who is not `user_id`.
pub fn other_participant(chat: &PrivateChat, user_id: i64) -> Result<i64, PrivateChatError> {
    chat.other_participant(user_id)
        .ok_or(PrivateChatError::NotFound)
}

/// Private chat service errors
#[derive(Debug, thiserror::Error)]
pub enum PrivateChatError {
    #[error("Private chat not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Access denied to this chat")]
    Forbidden,

    #[error("Cannot open a private chat with yourself")]
    SameUser,

    #[error("Message not found in this chat")]
    MessageNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrivateChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrivateChatError::NotFound
            | PrivateChatError::UserNotFound
            | PrivateChatError::MessageNotFound => ErrorKind::NotFound,
            PrivateChatError::Forbidden => ErrorKind::Forbidden,
            PrivateChatError::SameUser => ErrorKind::ValidationFailed,
            PrivateChatError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<PrivateChatError> for AppError {
    fn from(err: PrivateChatError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}

/// PrivateChatService implementation
pub struct PrivateChatServiceImpl {
    chat_repo: Arc<dyn PrivateChatRepository>,
    message_repo: Arc<dyn MessageRepository>,
    user_repo: Arc<dyn UserRepository>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl PrivateChatServiceImpl {
    pub fn new(
        chat_repo: Arc<dyn PrivateChatRepository>,
        message_repo: Arc<dyn MessageRepository>,
        user_repo: Arc<dyn UserRepository>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            chat_repo,
            message_repo,
            user_repo,
            id_generator,
        }
    }

    async fn unread_for(&self, chat: &PrivateChat, user_id: i64) -> Result<i64, PrivateChatError> {
        let cursor_message = chat
            .cursor_for(user_id)
            .and_then(|cursor| cursor.last_read_message_id);

        let after = match cursor_message {
            None => None,
            Some(message_id) => match self
                .message_repo
                .find_by_id(message_id)
                .await
                .map_err(|e| PrivateChatError::Internal(e.to_string()))?
            {
                Some(message) => Some(message.created_at),
                // Cursor points at a message that no longer exists
                None => return Ok(0),
            },
        };

        self.message_repo
            .count_unread(chat.id, user_id, after)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))
    }

    async fn summarize(&self, chat: PrivateChat, user_id: i64) -> Result<PrivateChatSummary, PrivateChatError> {
        let other_participant = match chat.other_participant(user_id) {
            Some(other_id) => self
                .user_repo
                .find_by_id(other_id)
                .await
                .map_err(|e| PrivateChatError::Internal(e.to_string()))?,
            None => None,
        };
        let last_message = match chat.last_message_id {
            Some(message_id) => self
                .message_repo
                .find_by_id(message_id)
                .await
                .map_err(|e| PrivateChatError::Internal(e.to_string()))?,
            None => None,
        };
        let unread_count = self.unread_for(&chat, user_id).await?;

        Ok(PrivateChatSummary {
            chat,
            other_participant,
            unread_count,
            last_message,
        })
    }

    async fn ensure_user(&self, user_id: i64) -> Result<(), PrivateChatError> {
        self.user_repo
            .find_by_id(user_id)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?
            .map(|_| ())
            .ok_or(PrivateChatError::UserNotFound)
    }
}

#[async_trait]
impl PrivateChatService for PrivateChatServiceImpl {
    async fn find_or_create(&self, user_a: i64, user_b: i64) -> Result<PrivateChat, PrivateChatError> {
        let pair = CanonicalPair::new(user_a, user_b).map_err(|_| PrivateChatError::SameUser)?;

        if let Some(chat) = self
            .chat_repo
            .find_active_by_pair(&pair)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?
        {
            return Ok(chat);
        }

        self.ensure_user(user_a).await?;
        self.ensure_user(user_b).await?;

        let candidate = PrivateChat::new(self.id_generator.generate(), pair, user_a);
        let chat = self
            .chat_repo
            .insert_active_or_get(&candidate)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?;

        if chat.id == candidate.id {
            metrics::record_private_chat_created();
            info!(chat_id = chat.id, pair = %pair, "Private chat created");
        }
        Ok(chat)
    }

    async fn get_participating(&self, chat_id: i64, user_id: i64) -> Result<PrivateChat, PrivateChatError> {
        let chat = self
            .chat_repo
            .find_by_id(chat_id)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?
            .ok_or(PrivateChatError::NotFound)?;

        if !chat.is_participant(user_id) {
            return Err(PrivateChatError::Forbidden);
        }
        Ok(chat)
    }

    async fn mark_read(
        &self,
        chat_id: i64,
        user_id: i64,
        message_id: Option<i64>,
    ) -> Result<PrivateChat, PrivateChatError> {
        let chat = self.get_participating(chat_id, user_id).await?;

        let target = match message_id {
            Some(message_id) => {
                let message = self
                    .message_repo
                    .find_by_id(message_id)
                    .await
                    .map_err(|e| PrivateChatError::Internal(e.to_string()))?
                    .ok_or(PrivateChatError::MessageNotFound)?;
                if message.target != MessageTarget::PrivateChat(chat.id) {
                    return Err(PrivateChatError::MessageNotFound);
                }
                Some(message.id)
            }
            None => chat.last_message_id,
        };

        let updated = self
            .chat_repo
            .update_read_cursor(chat.id, user_id, target, Utc::now())
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?
            .ok_or(PrivateChatError::NotFound)?;

        debug!(chat_id, user_id, message_id = ?target, "Read cursor moved");
        Ok(updated)
    }

    async fn unread_count(&self, chat_id: i64, user_id: i64) -> Result<i64, PrivateChatError> {
        let chat = self.get_participating(chat_id, user_id).await?;
        self.unread_for(&chat, user_id).await
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Page<PrivateChatSummary>, PrivateChatError> {
        let chats = self
            .chat_repo
            .find_active_by_participant(user_id, page.limit, page.offset())
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?;
        let total = self
            .chat_repo
            .count_active_by_participant(user_id)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?;

        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            summaries.push(self.summarize(chat, user_id).await?);
        }
        Ok(Page::new(summaries, page, total))
    }

    async fn details(&self, chat_id: i64, user_id: i64) -> Result<PrivateChatSummary, PrivateChatError> {
        let chat = self.get_participating(chat_id, user_id).await?;
        self.summarize(chat, user_id).await
    }

    async fn messages(
        &self,
        chat_id: i64,
        user_id: i64,
        page: PageRequest,
    ) -> Result<MessageHistory, PrivateChatError> {
        let chat = self.get_participating(chat_id, user_id).await?;

        let newest_first = self
            .message_repo
            .find_by_target(MessageTarget::PrivateChat(chat.id), page.limit, page.offset())
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?;

        if let Some(newest) = newest_first.first() {
            let current = chat
                .cursor_for(user_id)
                .and_then(|cursor| cursor.last_read_message_id);
            // Older pages must not pull the cursor backwards.
            if current.map_or(true, |read| newest.id > read) {
                self.chat_repo
                    .update_read_cursor(chat.id, user_id, Some(newest.id), Utc::now())
                    .await
                    .map_err(|e| PrivateChatError::Internal(e.to_string()))?;
            }
        }

        Ok(MessageHistory::from_newest_first(newest_first, page))
    }

    async fn deactivate(&self, chat_id: i64, user_id: i64) -> Result<PrivateChat, PrivateChatError> {
        let chat = self.get_participating(chat_id, user_id).await?;

        let updated = self
            .chat_repo
            .deactivate(chat.id)
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?
            .ok_or(PrivateChatError::NotFound)?;

        info!(chat_id, user_id, "Private chat deactivated");
        Ok(updated)
    }

    async fn record_activity(&self, chat_id: i64, message_id: i64) -> Result<(), PrivateChatError> {
        let touched = self
            .chat_repo
            .touch(chat_id, Some(message_id), Utc::now())
            .await
            .map_err(|e| PrivateChatError::Internal(e.to_string()))?;
        if !touched {
            return Err(PrivateChatError::NotFound);
        }
        Ok(())
    }
}
