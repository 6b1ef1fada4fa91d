use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{paginate, MemoryStore, Tables};
use crate::domain::{CanonicalPair, PrivateChat, PrivateChatRepository};
use crate::shared::error::AppError;

impl Tables {
    pub(crate) fn active_chat_id(&self, pair: &CanonicalPair) -> Option<i64> {
        self.private_chats
            .values()
            .find(|c| c.is_active && c.participants == *pair)
            .map(|c| c.id)
    }

    /// Find-or-insert under the caller's write guard.
    pub(crate) fn insert_active_or_get(&mut self, candidate: &PrivateChat) -> PrivateChat {
        if let Some(existing) = self
            .active_chat_id(&candidate.participants)
            .and_then(|id| self.private_chats.get(&id))
        {
            return existing.clone();
        }
        self.private_chats.insert(candidate.id, candidate.clone());
        candidate.clone()
    }
}

#[async_trait]
impl PrivateChatRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<PrivateChat>, AppError> {
        Ok(self.tables.read().private_chats.get(&id).cloned())
    }

    async fn find_active_by_pair(
        &self,
        pair: &CanonicalPair,
    ) -> Result<Option<PrivateChat>, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .active_chat_id(pair)
            .and_then(|id| tables.private_chats.get(&id))
            .cloned())
    }

    async fn insert_active_or_get(&self, candidate: &PrivateChat) -> Result<PrivateChat, AppError> {
        Ok(self.tables.write().insert_active_or_get(candidate))
    }

    async fn deactivate(&self, id: i64) -> Result<Option<PrivateChat>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.private_chats.get_mut(&id).map(|chat| {
            chat.deactivate();
            chat.clone()
        }))
    }

    async fn update_read_cursor(
        &self,
        id: i64,
        user_id: i64,
        message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<Option<PrivateChat>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.private_chats.get_mut(&id).map(|chat| {
            chat.set_cursor(user_id, message_id, at);
            chat.clone()
        }))
    }

    async fn touch(
        &self,
        id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write();
        match tables.private_chats.get_mut(&id) {
            Some(chat) => {
                chat.touch(last_message_id, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_active_by_participant(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrivateChat>, AppError> {
        let tables = self.tables.read();
        let mut chats: Vec<PrivateChat> = tables
            .private_chats
            .values()
            .filter(|c| c.is_active && c.is_participant(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(b.id.cmp(&a.id)));
        Ok(paginate(chats, limit, offset))
    }

    async fn count_active_by_participant(&self, user_id: i64) -> Result<i64, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .private_chats
            .values()
            .filter(|c| c.is_active && c.is_participant(user_id))
            .count() as i64)
    }
}
