//! User Repository Implementation
//!
//! PostgreSQL implementation of the UserRepository trait. The derived sets on
//! [`User`] (joined rooms, friends, request ids) are read from their owning
//! tables, so they can never drift from those rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{User, UserRepository};
use crate::shared::error::AppError;

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.username, u.email, u.is_online, u.last_seen, u.connection_id,
           u.created_at, u.updated_at,
           ARRAY(SELECT p.room_id FROM chat_room_participants p WHERE p.user_id = u.id) AS joined_rooms,
           ARRAY(SELECT f.friend_id FROM user_friends f WHERE f.user_id = u.id) AS friends,
           ARRAY(SELECT r.id FROM friend_requests r WHERE r.sender_id = u.id) AS friend_requests_sent,
           ARRAY(SELECT r.id FROM friend_requests r WHERE r.receiver_id = u.id) AS friend_requests_received
    FROM users u
"#;

/// Database row for `users` joined with its derived id arrays.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    is_online: bool,
    last_seen: DateTime<Utc>,
    connection_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    joined_rooms: Vec<i64>,
    friends: Vec<i64>,
    friend_requests_sent: Vec<i64>,
    friend_requests_received: Vec<i64>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            is_online: self.is_online,
            last_seen: self.last_seen,
            connection_id: self.connection_id,
            joined_rooms: self.joined_rooms.into_iter().collect(),
            friends: self.friends.into_iter().collect(),
            friend_requests_sent: self.friend_requests_sent.into_iter().collect(),
            friend_requests_received: self.friend_requests_received.into_iter().collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// PostgreSQL user repository implementation.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>, AppError> {
        let sql = format!("{USER_COLUMNS} WHERE {clause}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("{USER_COLUMNS} WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<User>, AppError> {
        let sql = format!("{USER_COLUMNS} WHERE u.id = ANY($1)");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("u.username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("u.email = LOWER($1)", email).await
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, is_online, last_seen, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.last_seen)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("User with this email or username already exists".to_string())
            }
            _ => AppError::Database(e),
        })?;

        self.find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", user.id)))
    }

    async fn bind_connection(
        &self,
        id: i64,
        connection_id: &str,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_online = TRUE, connection_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn release_connection(
        &self,
        id: i64,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Guarded on the connection id so a replaced connection cannot clear
        // its successor's binding.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_online = FALSE, connection_id = NULL, last_seen = $3, updated_at = $3
            WHERE id = $1 AND connection_id = $2
            "#,
        )
        .bind(id)
        .bind(connection_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_online(&self, limit: i64) -> Result<Vec<User>, AppError> {
        let sql = format!("{USER_COLUMNS} WHERE u.is_online ORDER BY u.username LIMIT $1");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }
}
