//! User Service
//!
//! Registration and profile lookups.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{User, UserRepository};
use crate::shared::error::{AppError, ErrorKind};
use crate::shared::snowflake::SnowflakeGenerator;

/// User service trait
#[async_trait]
pub trait UserService: Send + Sync {
    /// Register a new account. Username and email must both be unused.
    async fn register(&self, username: &str, email: &str) -> Result<User, UserError>;

    /// Get user by ID
    async fn get_user(&self, user_id: i64) -> Result<User, UserError>;

    /// Users currently online, by username
    async fn list_online(&self, limit: i64) -> Result<Vec<User>, UserError>;

    /// Mark the user online on `connection_id`, replacing any earlier binding.
    async fn bind_connection(&self, user_id: i64, connection_id: &str) -> Result<User, UserError>;

    /// Mark the user offline if `connection_id` is still the bound one.
    async fn release_connection(&self, user_id: i64, connection_id: &str) -> Result<bool, UserError>;
}

/// User service errors
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UserError::NotFound => ErrorKind::NotFound,
            UserError::Conflict(_) => ErrorKind::Conflict,
            UserError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}

/// UserService implementation
pub struct UserServiceImpl {
    user_repo: Arc<dyn UserRepository>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl UserServiceImpl {
    pub fn new(user_repo: Arc<dyn UserRepository>, id_generator: Arc<SnowflakeGenerator>) -> Self {
        Self {
            user_repo,
            id_generator,
        }
    }
}

#[async_trait]
impl UserService for UserServiceImpl {
    async fn register(&self, username: &str, email: &str) -> Result<User, UserError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();

        if self
            .user_repo
            .find_by_username(username)
            .await
            .map_err(|e| UserError::Internal(e.to_string()))?
            .is_some()
        {
            return Err(UserError::Conflict("Username is already taken".into()));
        }
        if self
            .user_repo
            .find_by_email(&email)
            .await
            .map_err(|e| UserError::Internal(e.to_string()))?
            .is_some()
        {
            return Err(UserError::Conflict("Email is already registered".into()));
        }

        let user = User::new(self.id_generator.generate(), username, email);

        // The store re-checks both unique keys; a racing registration lands here.
        let created = self.user_repo.create(&user).await.map_err(|e| match e {
            AppError::Conflict(msg) => UserError::Conflict(msg),
            other => UserError::Internal(other.to_string()),
        })?;

        info!(user_id = created.id, username = %created.username, "User registered");
        Ok(created)
    }

    async fn get_user(&self, user_id: i64) -> Result<User, UserError> {
        self.user_repo
            .find_by_id(user_id)
            .await
            .map_err(|e| UserError::Internal(e.to_string()))?
            .ok_or(UserError::NotFound)
    }

    async fn list_online(&self, limit: i64) -> Result<Vec<User>, UserError> {
        self.user_repo
            .find_online(limit)
            .await
            .map_err(|e| UserError::Internal(e.to_string()))
    }

    async fn bind_connection(&self, user_id: i64, connection_id: &str) -> Result<User, UserError> {
        let user = self
            .user_repo
            .bind_connection(user_id, connection_id)
            .await
            .map_err(|e| UserError::Internal(e.to_string()))?
            .ok_or(UserError::NotFound)?;

        debug!(user_id, connection_id, "Connection bound");
        Ok(user)
    }

    async fn release_connection(&self, user_id: i64, connection_id: &str) -> Result<bool, UserError> {
        let released = self
            .user_repo
            .release_connection(user_id, connection_id, Utc::now())
            .await
            .map_err(|e| UserError::Internal(e.to_string()))?;

        if !released {
            debug!(user_id, connection_id, "Stale connection release ignored");
        }
        Ok(released)
    }
}
