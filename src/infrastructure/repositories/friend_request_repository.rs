//! FriendRequest Repository Implementation
//!
//! PostgreSQL implementation of the FriendRequestRepository trait.
//!
//! - Pending uniqueness is the `uq_friend_requests_pending_pair` partial
//!   index, so `create_pending` is a single conditional insert.
//! - Status changes are compare-and-set updates guarded by
//!   `status = 'pending'`.
//! - Accept and friend removal each run in one transaction together with
//!   the friend links and the pair's private chat.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::private_chat_repository::{fetch_chat, insert_active_or_get_on};
use crate::domain::{
    AcceptOutcome, CanonicalPair, FriendRequest, FriendRequestRepository, FriendRequestStatus,
    FriendshipRemoval, PrivateChat, TransitionOutcome,
};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct FriendRequestRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    status: String,
    message: String,
    responded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FriendRequestRow {
    fn into_request(self) -> FriendRequest {
        FriendRequest {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            status: FriendRequestStatus::from_str(&self.status),
            message: self.message,
            responded_at: self.responded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const REQUEST_COLUMNS: &str =
    "id, sender_id, receiver_id, status, message, responded_at, created_at, updated_at";

/// Compare-and-set `pending -> to` on the given connection.
async fn cas_status(
    conn: &mut PgConnection,
    id: i64,
    to: FriendRequestStatus,
    at: DateTime<Utc>,
) -> Result<Option<FriendRequest>, AppError> {
    let sql = format!(
        r#"
        UPDATE friend_requests
        SET status = $2, responded_at = $3, updated_at = $3
        WHERE id = $1 AND status = 'pending'
        RETURNING {REQUEST_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, FriendRequestRow>(&sql)
        .bind(id)
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(FriendRequestRow::into_request))
}

/// PostgreSQL friend request repository implementation.
#[derive(Clone)]
pub struct PgFriendRequestRepository {
    pool: PgPool,
}

impl PgFriendRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list(
        &self,
        column: &str,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError> {
        let sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE {column} = $1 AND status = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, FriendRequestRow>(&sql)
            .bind(user_id)
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FriendRequestRow::into_request).collect())
    }

    async fn count(
        &self,
        column: &str,
        user_id: i64,
        status: FriendRequestStatus,
    ) -> Result<i64, AppError> {
        let sql = format!("SELECT COUNT(*) FROM friend_requests WHERE {column} = $1 AND status = $2");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl FriendRequestRepository for PgFriendRequestRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<FriendRequest>, AppError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = $1");
        let row = sqlx::query_as::<_, FriendRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FriendRequestRow::into_request))
    }

    async fn find_pending_between(&self, a: i64, b: i64) -> Result<Option<FriendRequest>, AppError> {
        let sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE status = 'pending'
              AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
            "#
        );
        let row = sqlx::query_as::<_, FriendRequestRow>(&sql)
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FriendRequestRow::into_request))
    }

    async fn create_pending(&self, request: &FriendRequest) -> Result<Option<FriendRequest>, AppError> {
        let sql = format!(
            r#"
            INSERT INTO friend_requests (id, sender_id, receiver_id, status, message,
                                         responded_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', $4, NULL, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, FriendRequestRow>(&sql)
            .bind(request.id)
            .bind(request.sender_id)
            .bind(request.receiver_id)
            .bind(&request.message)
            .bind(request.created_at)
            .bind(request.updated_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FriendRequestRow::into_request))
    }

    async fn transition(
        &self,
        id: i64,
        to: FriendRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(updated) = cas_status(&mut conn, id, to, at).await? {
            return Ok(TransitionOutcome::Applied(updated));
        }
        Ok(match self.find_by_id(id).await? {
            Some(current) => TransitionOutcome::NotPending(current),
            None => TransitionOutcome::NotFound,
        })
    }

    async fn accept(
        &self,
        id: i64,
        at: DateTime<Utc>,
        chat_candidate: &PrivateChat,
    ) -> Result<AcceptOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(request) = cas_status(&mut tx, id, FriendRequestStatus::Accepted, at).await? else {
            tx.rollback().await?;
            return Ok(match self.find_by_id(id).await? {
                Some(current) => AcceptOutcome::NotPending(current),
                None => AcceptOutcome::NotFound,
            });
        };

        if request.pair()? != chat_candidate.participants {
            return Err(AppError::Internal(
                "Chat candidate does not match the request's users".into(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO user_friends (user_id, friend_id, created_at)
            VALUES ($1, $2, $3), ($2, $1, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(request.sender_id)
        .bind(request.receiver_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let chat = insert_active_or_get_on(&mut tx, chat_candidate)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Private chat for {} changed concurrently, retry the acceptance",
                    chat_candidate.participants
                ))
            })?;

        tx.commit().await?;
        Ok(AcceptOutcome::Accepted { request, chat })
    }

    async fn remove_friendship(&self, a: i64, b: i64) -> Result<FriendshipRemoval, AppError> {
        let pair = CanonicalPair::new(a, b)?;
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM user_friends
            WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)
            "#,
        )
        .bind(a)
        .bind(b)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(FriendshipRemoval::NotFriends);
        }

        let deactivated_id = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE private_chats
            SET is_active = FALSE, updated_at = NOW()
            WHERE user_low = $1 AND user_high = $2 AND is_active
            RETURNING id
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&mut *tx)
        .await?;

        let deactivated_chat = match deactivated_id {
            Some(chat_id) => fetch_chat(&mut tx, chat_id).await?,
            None => None,
        };

        tx.commit().await?;
        Ok(FriendshipRemoval::Removed { deactivated_chat })
    }

    async fn find_by_receiver(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError> {
        self.list("receiver_id", user_id, status, limit, offset).await
    }

    async fn count_by_receiver(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
    ) -> Result<i64, AppError> {
        self.count("receiver_id", user_id, status).await
    }

    async fn find_by_sender(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError> {
        self.list("sender_id", user_id, status, limit, offset).await
    }

    async fn count_by_sender(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
    ) -> Result<i64, AppError> {
        self.count("sender_id", user_id, status).await
    }
}
