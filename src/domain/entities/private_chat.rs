//! PrivateChat entity and repository trait.
//!
//! Maps to the `private_chats` table and its `private_chat_read_cursors` rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::CanonicalPair;
use crate::shared::error::AppError;

/// A participant's read position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadCursor {
    pub user_id: i64,
    pub last_read_message_id: Option<i64>,
    pub last_read_at: DateTime<Utc>,
}

/// A 1:1 conversation between two users.
///
/// At most one active chat exists per [`CanonicalPair`]. Chats are never
/// reactivated: once inactive, a new chat is created for the same pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateChat {
    pub id: i64,
    pub participants: CanonicalPair,
    pub last_message_id: Option<i64>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub read_cursors: Vec<ReadCursor>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrivateChat {
    /// Create an active chat with both cursors initialized to now and no
    /// message read yet.
    pub fn new(id: i64, participants: CanonicalPair, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            participants,
            last_message_id: None,
            last_activity: now,
            is_active: true,
            read_cursors: participants
                .members()
                .iter()
                .map(|&user_id| ReadCursor {
                    user_id,
                    last_read_message_id: None,
                    last_read_at: now,
                })
                .collect(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: i64) -> bool {
        self.participants.contains(user_id)
    }

    pub fn other_participant(&self, user_id: i64) -> Option<i64> {
        self.participants.other(user_id)
    }

    pub fn cursor_for(&self, user_id: i64) -> Option<&ReadCursor> {
        self.read_cursors.iter().find(|c| c.user_id == user_id)
    }

    /// Move `user_id`'s cursor. Returns `false` for non-participants.
    pub fn set_cursor(&mut self, user_id: i64, message_id: Option<i64>, at: DateTime<Utc>) -> bool {
        if !self.is_participant(user_id) {
            return false;
        }
        match self.read_cursors.iter_mut().find(|c| c.user_id == user_id) {
            Some(cursor) => {
                cursor.last_read_message_id = message_id;
                cursor.last_read_at = at;
            }
            None => self.read_cursors.push(ReadCursor {
                user_id,
                last_read_message_id: message_id,
                last_read_at: at,
            }),
        }
        self.updated_at = at;
        true
    }

    pub fn touch(&mut self, last_message_id: Option<i64>, at: DateTime<Utc>) {
        if last_message_id.is_some() {
            self.last_message_id = last_message_id;
        }
        self.last_activity = at;
        self.updated_at = at;
    }

    pub fn deactivate(&mut self) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.updated_at = Utc::now();
        true
    }
}

/// Repository trait for PrivateChat data access operations.
#[async_trait]
pub trait PrivateChatRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<PrivateChat>, AppError>;

    async fn find_active_by_pair(&self, pair: &CanonicalPair)
        -> Result<Option<PrivateChat>, AppError>;

    /// Insert `candidate` unless an active chat already exists for its pair,
    /// in which case the existing chat is returned. Atomic per pair.
    async fn insert_active_or_get(&self, candidate: &PrivateChat) -> Result<PrivateChat, AppError>;

    /// Set `is_active = false`. Returns the chat as stored afterwards.
    async fn deactivate(&self, id: i64) -> Result<Option<PrivateChat>, AppError>;

    async fn update_read_cursor(
        &self,
        id: i64,
        user_id: i64,
        message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<Option<PrivateChat>, AppError>;

    async fn touch(
        &self,
        id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Active chats involving `user_id`, most recently active first.
    async fn find_active_by_participant(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrivateChat>, AppError>;

    async fn count_active_by_participant(&self, user_id: i64) -> Result<i64, AppError>;
}
