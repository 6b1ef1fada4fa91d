use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{paginate, MemoryStore};
use crate::domain::{Message, MessageRepository, MessageTarget};
use crate::shared::error::AppError;

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.tables.read().messages.get(&id).cloned())
    }

    async fn create(&self, message: &Message) -> Result<Message, AppError> {
        let mut tables = self.tables.write();
        if tables.messages.contains_key(&message.id) {
            return Err(AppError::Conflict(format!(
                "Message {} already exists",
                message.id
            )));
        }
        tables.messages.insert(message.id, message.clone());
        Ok(message.clone())
    }

    async fn find_by_target(
        &self,
        target: MessageTarget,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read();
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.target == target)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(messages, limit, offset))
    }

    async fn count_by_target(&self, target: MessageTarget) -> Result<i64, AppError> {
        let tables = self.tables.read();
        Ok(tables.messages.values().filter(|m| m.target == target).count() as i64)
    }

    async fn record_read(
        &self,
        id: i64,
        reader_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<(Message, bool)>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.messages.get_mut(&id).map(|message| {
            let appended = message.mark_read(reader_id, at);
            (message.clone(), appended)
        }))
    }

    async fn mark_delivered(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write();
        Ok(tables
            .messages
            .get_mut(&id)
            .is_some_and(|message| message.mark_delivered()))
    }

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.messages.get_mut(&id).map(|message| {
            message.edit(content, edited_at);
            message.clone()
        }))
    }

    async fn count_unread(
        &self,
        private_chat_id: i64,
        reader_id: i64,
        after: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError> {
        let target = MessageTarget::PrivateChat(private_chat_id);
        let tables = self.tables.read();
        Ok(tables
            .messages
            .values()
            .filter(|m| m.target == target && m.sender_id != reader_id)
            .filter(|m| after.map_or(true, |cutoff| m.created_at > cutoff))
            .count() as i64)
    }
}
