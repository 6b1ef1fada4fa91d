//! FriendRequest entity and repository trait.
//!
//! Maps to the `friend_requests` table. The repository also owns the two
//! operations that change the friend graph, since each must update users,
//! requests and private chats in one atomic step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::private_chat::PrivateChat;
use crate::domain::value_objects::CanonicalPair;
use crate::shared::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl FriendRequestStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: FriendRequestStatus,
    /// Optional note from the sender (empty when absent)
    pub message: String,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn new(id: i64, sender_id: i64, receiver_id: i64, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            sender_id,
            receiver_id,
            status: FriendRequestStatus::Pending,
            message: message.into(),
            responded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == FriendRequestStatus::Pending
    }

    pub fn pair(&self) -> Result<CanonicalPair, AppError> {
        CanonicalPair::new(self.sender_id, self.receiver_id)
    }

    /// Move from `pending` to a terminal status, exactly once.
    pub fn transition(&mut self, to: FriendRequestStatus, at: DateTime<Utc>) -> Result<(), AppError> {
        if !self.is_pending() {
            return Err(AppError::InvalidState(
                "Friend request is no longer pending".into(),
            ));
        }
        if !to.is_terminal() {
            return Err(AppError::InvalidState(
                "Friend request can only move to a terminal status".into(),
            ));
        }
        self.status = to;
        self.responded_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

/// Result of a compare-and-set on a request's status.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(FriendRequest),
    /// The request had already left `pending`; carries it unchanged.
    NotPending(FriendRequest),
    NotFound,
}

/// Result of accepting a request.
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Accepted {
        request: FriendRequest,
        chat: PrivateChat,
    },
    NotPending(FriendRequest),
    NotFound,
}

/// Result of dissolving a friendship.
#[derive(Debug, Clone)]
pub enum FriendshipRemoval {
    /// Links removed; carries the chat that was deactivated, if one was active.
    Removed { deactivated_chat: Option<PrivateChat> },
    NotFriends,
}

/// Repository trait for FriendRequest data access operations.
#[async_trait]
pub trait FriendRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<FriendRequest>, AppError>;

    /// Pending request between the two users, in either direction.
    async fn find_pending_between(&self, a: i64, b: i64) -> Result<Option<FriendRequest>, AppError>;

    /// Insert a pending request and record its id on both users.
    ///
    /// Returns `None` without writing anything if a pending request already
    /// exists for the unordered pair. Atomic per pair.
    async fn create_pending(&self, request: &FriendRequest) -> Result<Option<FriendRequest>, AppError>;

    /// Compare-and-set `pending -> to` (decline / cancel).
    async fn transition(
        &self,
        id: i64,
        to: FriendRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError>;

    /// Accept in one atomic step: `pending -> accepted`, mutual friend links,
    /// and find-or-create of the pair's active private chat (`chat_candidate`
    /// is inserted only if no active chat exists).
    async fn accept(
        &self,
        id: i64,
        at: DateTime<Utc>,
        chat_candidate: &PrivateChat,
    ) -> Result<AcceptOutcome, AppError>;

    /// Remove mutual friend links and deactivate the pair's active chat.
    async fn remove_friendship(&self, a: i64, b: i64) -> Result<FriendshipRemoval, AppError>;

    /// Requests received by `user_id` with `status`, newest first.
    async fn find_by_receiver(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError>;

    async fn count_by_receiver(&self, user_id: i64, status: FriendRequestStatus)
        -> Result<i64, AppError>;

    /// Requests sent by `user_id` with `status`, newest first.
    async fn find_by_sender(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError>;

    async fn count_by_sender(&self, user_id: i64, status: FriendRequestStatus)
        -> Result<i64, AppError>;
}
