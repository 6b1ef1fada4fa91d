//! User entity and repository trait.
//!
//! Maps to the `users` table plus the `user_friends` link table. Joined rooms
//! and friend request ids are read from `chat_room_participants` and
//! `friend_requests`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Represents a user account in the chat system.
///
/// Presence fields obey one rule: `is_online` is true exactly when
/// `connection_id` is set. Only [`User::bind_connection`] and
/// [`User::release_connection`] touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Username (3-30 characters, unique)
    pub username: String,

    /// Email address (unique, lowercase)
    pub email: String,

    pub is_online: bool,

    pub last_seen: DateTime<Utc>,

    /// Identifier of the live gateway connection, if any
    pub connection_id: Option<String>,

    pub joined_rooms: BTreeSet<i64>,

    pub friends: BTreeSet<i64>,

    /// Ids of friend requests this user sent
    pub friend_requests_sent: BTreeSet<i64>,

    /// Ids of friend requests this user received
    pub friend_requests_received: BTreeSet<i64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a freshly registered, offline user.
    pub fn new(id: i64, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            email: email.into().to_lowercase(),
            is_online: false,
            last_seen: now,
            connection_id: None,
            joined_rooms: BTreeSet::new(),
            friends: BTreeSet::new(),
            friend_requests_sent: BTreeSet::new(),
            friend_requests_received: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_friend(&self, other: i64) -> bool {
        self.friends.contains(&other)
    }

    /// Bind a live connection, replacing any previous one.
    pub fn bind_connection(&mut self, connection_id: impl Into<String>) {
        self.connection_id = Some(connection_id.into());
        self.is_online = true;
        self.updated_at = Utc::now();
    }

    /// Clear the binding if `connection_id` is still the bound connection.
    ///
    /// Returns `false` when another connection has replaced it since, in which
    /// case presence is left untouched.
    pub fn release_connection(&mut self, connection_id: &str, at: DateTime<Utc>) -> bool {
        if self.connection_id.as_deref() != Some(connection_id) {
            return false;
        }
        self.connection_id = None;
        self.is_online = false;
        self.last_seen = at;
        self.updated_at = at;
        true
    }

    /// Whether the online flag agrees with the connection binding.
    pub fn presence_is_consistent(&self) -> bool {
        self.is_online == self.connection_id.is_some()
    }
}

/// Repository trait for User data access operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by their Snowflake ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Find all users among `ids`. Missing ids are skipped.
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<User>, AppError>;

    /// Find a user by username (exact match).
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Find a user by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Create a new user. Fails with `AppError::Conflict` on a taken
    /// username or email.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Mark the user online on `connection_id`. Returns `None` if the user
    /// does not exist.
    async fn bind_connection(&self, id: i64, connection_id: &str)
        -> Result<Option<User>, AppError>;

    /// Mark the user offline if `connection_id` is still bound.
    async fn release_connection(
        &self,
        id: i64,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Users currently flagged online, by username.
    async fn find_online(&self, limit: i64) -> Result<Vec<User>, AppError>;
}
