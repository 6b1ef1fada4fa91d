//! Message Repository Implementation
//!
//! PostgreSQL implementation of the MessageRepository trait. Read receipts
//! live in `message_reads`; the single-destination rule is also enforced by
//! the `messages_single_target` CHECK constraint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{
    DeliveryStatus, Message, MessageRepository, MessageTarget, MessageType, ReadReceipt,
};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    sender_id: i64,
    room_id: Option<i64>,
    private_chat_id: Option<i64>,
    message_type: String,
    delivery_status: String,
    reply_to_id: Option<i64>,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self, read_by: Vec<ReadReceipt>) -> Result<Message, AppError> {
        Ok(Message {
            id: self.id,
            content: self.content,
            sender_id: self.sender_id,
            target: MessageTarget::from_parts(self.room_id, self.private_chat_id)?,
            message_type: MessageType::from_str(&self.message_type),
            delivery_status: DeliveryStatus::from_str(&self.delivery_status),
            read_by,
            reply_to_id: self.reply_to_id,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadRow {
    message_id: i64,
    user_id: i64,
    read_at: DateTime<Utc>,
}

const MESSAGE_COLUMNS: &str = r#"
    id, content, sender_id, room_id, private_chat_id, message_type, delivery_status,
    reply_to_id, is_edited, edited_at, created_at
"#;

async fn hydrate(conn: &mut PgConnection, rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let reads = sqlx::query_as::<_, ReadRow>(
        "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id = ANY($1) ORDER BY read_at",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_message: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
    for read in reads {
        by_message.entry(read.message_id).or_default().push(ReadReceipt {
            user_id: read.user_id,
            read_at: read.read_at,
        });
    }

    rows.into_iter()
        .map(|row| {
            let receipts = by_message.remove(&row.id).unwrap_or_default();
            row.into_message(receipts)
        })
        .collect()
}

async fn fetch_message(conn: &mut PgConnection, id: i64) -> Result<Option<Message>, AppError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// PostgreSQL message repository implementation.
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_message(&mut conn, id).await
    }

    async fn create(&self, message: &Message) -> Result<Message, AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, content, sender_id, room_id, private_chat_id, message_type,
                                  delivery_status, reply_to_id, is_edited, edited_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(message.id)
        .bind(&message.content)
        .bind(message.sender_id)
        .bind(message.target.room_id())
        .bind(message.target.private_chat_id())
        .bind(message.message_type.as_str())
        .bind(message.delivery_status.as_str())
        .bind(message.reply_to_id)
        .bind(message.is_edited)
        .bind(message.edited_at)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(message.clone())
    }

    async fn find_by_target(
        &self,
        target: MessageTarget,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE room_id IS NOT DISTINCT FROM $1
              AND private_chat_id IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(target.room_id())
            .bind(target.private_chat_id())
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    async fn count_by_target(&self, target: MessageTarget) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE room_id IS NOT DISTINCT FROM $1
              AND private_chat_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(target.room_id())
        .bind(target.private_chat_id())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn record_read(
        &self,
        id: i64,
        reader_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<(Message, bool)>, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM messages WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let appended = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(reader_id)
        .bind(at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if appended {
            sqlx::query(
                "UPDATE messages SET delivery_status = 'read' WHERE id = $1 AND delivery_status = 'delivered'",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let message = fetch_message(&mut tx, id).await?;
        tx.commit().await?;
        Ok(message.map(|m| (m, appended)))
    }

    async fn mark_delivered(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET delivery_status = 'delivered' WHERE id = $1 AND delivery_status = 'sent'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "UPDATE messages SET content = $2, is_edited = TRUE, edited_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(content)
        .bind(edited_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        fetch_message(&mut conn, id).await
    }

    async fn count_unread(
        &self,
        private_chat_id: i64,
        reader_id: i64,
        after: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE private_chat_id = $1
              AND sender_id <> $2
              AND ($3::timestamptz IS NULL OR created_at > $3)
            "#,
        )
        .bind(private_chat_id)
        .bind(reader_id)
        .bind(after)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
