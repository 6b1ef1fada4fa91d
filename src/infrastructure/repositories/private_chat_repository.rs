//! PrivateChat Repository Implementation
//!
//! PostgreSQL implementation of the PrivateChatRepository trait. The
//! one-active-chat-per-pair rule is the `uq_private_chats_active_pair`
//! partial unique index; inserts use `ON CONFLICT DO NOTHING` and re-read the
//! surviving row instead of checking first.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use crate::domain::{CanonicalPair, PrivateChat, PrivateChatRepository, ReadCursor};
use crate::shared::error::AppError;

/// Attempts before giving up when the winning row keeps disappearing
/// between our conflicting insert and the re-read.
const INSERT_ATTEMPTS: usize = 3;

#[derive(Debug, sqlx::FromRow)]
struct PrivateChatRow {
    id: i64,
    user_low: i64,
    user_high: i64,
    last_message_id: Option<i64>,
    last_activity: DateTime<Utc>,
    is_active: bool,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PrivateChatRow {
    fn into_chat(self, read_cursors: Vec<ReadCursor>) -> Result<PrivateChat, AppError> {
        Ok(PrivateChat {
            id: self.id,
            participants: CanonicalPair::new(self.user_low, self.user_high)?,
            last_message_id: self.last_message_id,
            last_activity: self.last_activity,
            is_active: self.is_active,
            read_cursors,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CursorRow {
    chat_id: i64,
    user_id: i64,
    last_read_message_id: Option<i64>,
    last_read_at: DateTime<Utc>,
}

const CHAT_COLUMNS: &str = r#"
    id, user_low, user_high, last_message_id, last_activity, is_active,
    created_by, created_at, updated_at
"#;

async fn hydrate(
    conn: &mut PgConnection,
    rows: Vec<PrivateChatRow>,
) -> Result<Vec<PrivateChat>, AppError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let cursors = sqlx::query_as::<_, CursorRow>(
        r#"
        SELECT chat_id, user_id, last_read_message_id, last_read_at
        FROM private_chat_read_cursors
        WHERE chat_id = ANY($1)
        ORDER BY user_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_chat: HashMap<i64, Vec<ReadCursor>> = HashMap::new();
    for cursor in cursors {
        by_chat.entry(cursor.chat_id).or_default().push(ReadCursor {
            user_id: cursor.user_id,
            last_read_message_id: cursor.last_read_message_id,
            last_read_at: cursor.last_read_at,
        });
    }

    rows.into_iter()
        .map(|row| {
            let cursors = by_chat.remove(&row.id).unwrap_or_default();
            row.into_chat(cursors)
        })
        .collect()
}

pub(crate) async fn fetch_chat(conn: &mut PgConnection, id: i64) -> Result<Option<PrivateChat>, AppError> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM private_chats WHERE id = $1");
    let row = sqlx::query_as::<_, PrivateChatRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn fetch_active_by_pair(
    conn: &mut PgConnection,
    pair: &CanonicalPair,
) -> Result<Option<PrivateChat>, AppError> {
    let sql = format!(
        "SELECT {CHAT_COLUMNS} FROM private_chats WHERE user_low = $1 AND user_high = $2 AND is_active"
    );
    let row = sqlx::query_as::<_, PrivateChatRow>(&sql)
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Insert `candidate` (and its cursors) unless the pair already has an active
/// chat, then return whichever chat is active for the pair.
///
/// Runs on the caller's connection so it can join an outer transaction.
/// `None` means the conflicting row was deactivated before it could be read.
pub(crate) async fn insert_active_or_get_on(
    conn: &mut PgConnection,
    candidate: &PrivateChat,
) -> Result<Option<PrivateChat>, AppError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO private_chats (id, user_low, user_high, last_message_id, last_activity,
                                   is_active, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(candidate.id)
    .bind(candidate.participants.low())
    .bind(candidate.participants.high())
    .bind(candidate.last_message_id)
    .bind(candidate.last_activity)
    .bind(candidate.created_by)
    .bind(candidate.created_at)
    .bind(candidate.updated_at)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    if inserted {
        for cursor in &candidate.read_cursors {
            sqlx::query(
                r#"
                INSERT INTO private_chat_read_cursors (chat_id, user_id, last_read_message_id, last_read_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(candidate.id)
            .bind(cursor.user_id)
            .bind(cursor.last_read_message_id)
            .bind(cursor.last_read_at)
            .execute(&mut *conn)
            .await?;
        }
    }

    fetch_active_by_pair(conn, &candidate.participants).await
}

/// PostgreSQL private chat repository implementation.
#[derive(Clone)]
pub struct PgPrivateChatRepository {
    pool: PgPool,
}

impl PgPrivateChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrivateChatRepository for PgPrivateChatRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<PrivateChat>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_chat(&mut conn, id).await
    }

    async fn find_active_by_pair(
        &self,
        pair: &CanonicalPair,
    ) -> Result<Option<PrivateChat>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_active_by_pair(&mut conn, pair).await
    }

    async fn insert_active_or_get(&self, candidate: &PrivateChat) -> Result<PrivateChat, AppError> {
        for attempt in 1..=INSERT_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            if let Some(chat) = insert_active_or_get_on(&mut tx, candidate).await? {
                tx.commit().await?;
                return Ok(chat);
            }
            tx.rollback().await?;
            warn!(
                pair = %candidate.participants,
                attempt,
                "Active private chat vanished during insert, retrying"
            );
        }
        Err(AppError::Conflict(format!(
            "Could not settle an active private chat for {}",
            candidate.participants
        )))
    }

    async fn deactivate(&self, id: i64) -> Result<Option<PrivateChat>, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            "UPDATE private_chats SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        fetch_chat(&mut conn, id).await
    }

    async fn update_read_cursor(
        &self,
        id: i64,
        user_id: i64,
        message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<Option<PrivateChat>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO private_chat_read_cursors (chat_id, user_id, last_read_message_id, last_read_at)
            SELECT c.id, $2, $3, $4 FROM private_chats c
            WHERE c.id = $1 AND $2 IN (c.user_low, c.user_high)
            ON CONFLICT (chat_id, user_id)
            DO UPDATE SET last_read_message_id = EXCLUDED.last_read_message_id,
                          last_read_at = EXCLUDED.last_read_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(message_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE private_chats SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let chat = fetch_chat(&mut tx, id).await?;
        tx.commit().await?;
        Ok(chat)
    }

    async fn touch(
        &self,
        id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE private_chats
            SET last_message_id = COALESCE($2, last_message_id),
                last_activity = $3,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_message_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_active_by_participant(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrivateChat>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            r#"
            SELECT {CHAT_COLUMNS} FROM private_chats
            WHERE is_active AND (user_low = $1 OR user_high = $1)
            ORDER BY last_activity DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, PrivateChatRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    async fn count_active_by_participant(&self, user_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM private_chats WHERE is_active AND (user_low = $1 OR user_high = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
