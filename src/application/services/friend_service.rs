//! Friend Service
//!
//! The friend request state machine and the friend graph queries built on it.
//!
//! A request leaves `pending` exactly once. Acceptance links both users and
//! settles the pair's private chat in the same store operation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::private_chat_service::{PrivateChatError, PrivateChatService};
use crate::application::pagination::{Page, PageRequest};
use crate::domain::{
    AcceptOutcome, CanonicalPair, FriendRequest, FriendRequestRepository, FriendRequestStatus,
    FriendshipRemoval, PrivateChat, TransitionOutcome, User, UserRepository,
};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, ErrorKind};
use crate::shared::snowflake::SnowflakeGenerator;

/// Receiver's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

/// Result of answering a request. `chat` is set on acceptance.
#[derive(Debug, Clone)]
pub struct FriendResponse {
    pub request: FriendRequest,
    pub chat: Option<PrivateChat>,
}

/// A request together with the user on the other side of it.
#[derive(Debug, Clone)]
pub struct FriendRequestView {
    pub request: FriendRequest,
    pub counterpart: Option<User>,
}

/// Friend service trait
#[async_trait]
pub trait FriendService: Send + Sync {
    async fn send_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        message: Option<String>,
    ) -> Result<FriendRequest, FriendError>;

    /// Accept or decline a request addressed to `responder_id`.
    async fn respond(
        &self,
        request_id: i64,
        responder_id: i64,
        decision: Decision,
    ) -> Result<FriendResponse, FriendError>;

    async fn get_request(&self, request_id: i64) -> Result<FriendRequest, FriendError>;

    /// Withdraw a pending request; sender only.
    async fn cancel(&self, request_id: i64, sender_id: i64) -> Result<FriendRequest, FriendError>;

    async fn are_friends(&self, a: i64, b: i64) -> Result<bool, FriendError>;

    async fn exists_pending_between(&self, a: i64, b: i64) -> Result<bool, FriendError>;

    /// Dissolve a friendship. Returns the private chat it deactivated, if any.
    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<Option<PrivateChat>, FriendError>;

    async fn list_received(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        page: PageRequest,
    ) -> Result<Page<FriendRequestView>, FriendError>;

    async fn list_sent(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        page: PageRequest,
    ) -> Result<Page<FriendRequestView>, FriendError>;

    /// Friends ordered online-first, then by username. `search` filters on
    /// username or email, case-insensitively.
    async fn list_friends(
        &self,
        user_id: i64,
        page: PageRequest,
        search: Option<&str>,
    ) -> Result<Page<User>, FriendError>;

    /// The active private chat with a friend, created on first use.
    async fn get_or_create_chat_with(&self, user_id: i64, friend_id: i64) -> Result<PrivateChat, FriendError>;
}

/// Friend service errors
#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("Cannot send friend request to yourself")]
    SelfRequest,

    #[error("User not found")]
    UserNotFound,

    #[error("Friend request not found")]
    RequestNotFound,

    #[error("Users are already friends")]
    AlreadyFriends,

    #[error("Friend request already exists")]
    DuplicateRequest,

    #[error("Not allowed to act on this friend request")]
    Forbidden,

    #[error("Friend request is no longer pending")]
    NotPending,

    #[error("Users are not friends")]
    NotFriends,

    #[error(transparent)]
    Chat(#[from] PrivateChatError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FriendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FriendError::SelfRequest => ErrorKind::ValidationFailed,
            FriendError::UserNotFound | FriendError::RequestNotFound => ErrorKind::NotFound,
            FriendError::AlreadyFriends | FriendError::DuplicateRequest => ErrorKind::Conflict,
            FriendError::Forbidden => ErrorKind::Forbidden,
            FriendError::NotPending | FriendError::NotFriends => ErrorKind::InvalidState,
            FriendError::Chat(e) => e.kind(),
            FriendError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<FriendError> for AppError {
    fn from(err: FriendError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}

/// FriendService implementation
pub struct FriendServiceImpl {
    request_repo: Arc<dyn FriendRequestRepository>,
    user_repo: Arc<dyn UserRepository>,
    chats: Arc<dyn PrivateChatService>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl FriendServiceImpl {
    pub fn new(
        request_repo: Arc<dyn FriendRequestRepository>,
        user_repo: Arc<dyn UserRepository>,
        chats: Arc<dyn PrivateChatService>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            request_repo,
            user_repo,
            chats,
            id_generator,
        }
    }

    async fn find_user(&self, user_id: i64) -> Result<User, FriendError> {
        self.user_repo
            .find_by_id(user_id)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
            .ok_or(FriendError::UserNotFound)
    }

    async fn find_request(&self, request_id: i64) -> Result<FriendRequest, FriendError> {
        self.request_repo
            .find_by_id(request_id)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
            .ok_or(FriendError::RequestNotFound)
    }

    async fn apply_transition(
        &self,
        request_id: i64,
        to: FriendRequestStatus,
    ) -> Result<FriendRequest, FriendError> {
        match self
            .request_repo
            .transition(request_id, to, Utc::now())
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
        {
            TransitionOutcome::Applied(request) => {
                metrics::record_friend_request(request.status.as_str());
                info!(
                    request_id,
                    sender_id = request.sender_id,
                    receiver_id = request.receiver_id,
                    status = %request.status,
                    "Friend request transitioned"
                );
                Ok(request)
            }
            TransitionOutcome::NotPending(_) => Err(FriendError::NotPending),
            TransitionOutcome::NotFound => Err(FriendError::RequestNotFound),
        }
    }

    async fn with_counterparts(
        &self,
        requests: Vec<FriendRequest>,
        counterpart_of: fn(&FriendRequest) -> i64,
    ) -> Result<Vec<FriendRequestView>, FriendError> {
        let ids: Vec<i64> = requests.iter().map(counterpart_of).collect();
        let users = self
            .user_repo
            .find_by_ids(&ids)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;

        Ok(requests
            .into_iter()
            .map(|request| {
                let id = counterpart_of(&request);
                FriendRequestView {
                    counterpart: users.iter().find(|u| u.id == id).cloned(),
                    request,
                }
            })
            .collect())
    }
}

#[async_trait]
impl FriendService for FriendServiceImpl {
    async fn send_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        message: Option<String>,
    ) -> Result<FriendRequest, FriendError> {
        if sender_id == receiver_id {
            return Err(FriendError::SelfRequest);
        }

        self.find_user(receiver_id).await?;
        let sender = self.find_user(sender_id).await?;
        if sender.is_friend(receiver_id) {
            return Err(FriendError::AlreadyFriends);
        }
        if self.exists_pending_between(sender_id, receiver_id).await? {
            return Err(FriendError::DuplicateRequest);
        }

        let message = message.map(|m| m.trim().to_string()).unwrap_or_default();
        let request = FriendRequest::new(self.id_generator.generate(), sender_id, receiver_id, message);

        // Losing a race against a concurrent request for the pair yields None.
        let created = self
            .request_repo
            .create_pending(&request)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
            .ok_or(FriendError::DuplicateRequest)?;

        metrics::record_friend_request(created.status.as_str());
        info!(request_id = created.id, sender_id, receiver_id, "Friend request sent");
        Ok(created)
    }

    async fn respond(
        &self,
        request_id: i64,
        responder_id: i64,
        decision: Decision,
    ) -> Result<FriendResponse, FriendError> {
        let request = self.find_request(request_id).await?;
        if request.receiver_id != responder_id {
            return Err(FriendError::Forbidden);
        }
        if !request.is_pending() {
            return Err(FriendError::NotPending);
        }

        if decision == Decision::Decline {
            let request = self
                .apply_transition(request_id, FriendRequestStatus::Declined)
                .await?;
            return Ok(FriendResponse { request, chat: None });
        }

        let pair = request
            .pair()
            .map_err(|e| FriendError::Internal(e.to_string()))?;
        let candidate = PrivateChat::new(self.id_generator.generate(), pair, request.sender_id);

        match self
            .request_repo
            .accept(request_id, Utc::now(), &candidate)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
        {
            AcceptOutcome::Accepted { request, chat } => {
                metrics::record_friend_request(request.status.as_str());
                if chat.id == candidate.id {
                    metrics::record_private_chat_created();
                }
                info!(
                    request_id,
                    sender_id = request.sender_id,
                    receiver_id = request.receiver_id,
                    chat_id = chat.id,
                    "Friend request accepted"
                );
                Ok(FriendResponse {
                    request,
                    chat: Some(chat),
                })
            }
            AcceptOutcome::NotPending(_) => Err(FriendError::NotPending),
            AcceptOutcome::NotFound => Err(FriendError::RequestNotFound),
        }
    }

    async fn get_request(&self, request_id: i64) -> Result<FriendRequest, FriendError> {
        self.find_request(request_id).await
    }

    async fn cancel(&self, request_id: i64, sender_id: i64) -> Result<FriendRequest, FriendError> {
        let request = self.find_request(request_id).await?;
        if request.sender_id != sender_id {
            return Err(FriendError::Forbidden);
        }
        if !request.is_pending() {
            return Err(FriendError::NotPending);
        }
        self.apply_transition(request_id, FriendRequestStatus::Cancelled)
            .await
    }

    async fn are_friends(&self, a: i64, b: i64) -> Result<bool, FriendError> {
        Ok(self
            .user_repo
            .find_by_id(a)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
            .is_some_and(|user| user.is_friend(b)))
    }

    async fn exists_pending_between(&self, a: i64, b: i64) -> Result<bool, FriendError> {
        Ok(self
            .request_repo
            .find_pending_between(a, b)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
            .is_some())
    }

    async fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<Option<PrivateChat>, FriendError> {
        if CanonicalPair::new(user_id, friend_id).is_err() {
            return Err(FriendError::NotFriends);
        }

        match self
            .request_repo
            .remove_friendship(user_id, friend_id)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?
        {
            FriendshipRemoval::Removed { deactivated_chat } => {
                info!(
                    user_id,
                    friend_id,
                    chat_id = ?deactivated_chat.as_ref().map(|c| c.id),
                    "Friendship removed"
                );
                Ok(deactivated_chat)
            }
            FriendshipRemoval::NotFriends => Err(FriendError::NotFriends),
        }
    }

    async fn list_received(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        page: PageRequest,
    ) -> Result<Page<FriendRequestView>, FriendError> {
        let requests = self
            .request_repo
            .find_by_receiver(user_id, status, page.limit, page.offset())
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;
        let total = self
            .request_repo
            .count_by_receiver(user_id, status)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;

        let views = self.with_counterparts(requests, |r| r.sender_id).await?;
        Ok(Page::new(views, page, total))
    }

    async fn list_sent(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        page: PageRequest,
    ) -> Result<Page<FriendRequestView>, FriendError> {
        let requests = self
            .request_repo
            .find_by_sender(user_id, status, page.limit, page.offset())
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;
        let total = self
            .request_repo
            .count_by_sender(user_id, status)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;

        let views = self.with_counterparts(requests, |r| r.receiver_id).await?;
        Ok(Page::new(views, page, total))
    }

    async fn list_friends(
        &self,
        user_id: i64,
        page: PageRequest,
        search: Option<&str>,
    ) -> Result<Page<User>, FriendError> {
        let user = self.find_user(user_id).await?;
        let ids: Vec<i64> = user.friends.iter().copied().collect();
        let mut friends = self
            .user_repo
            .find_by_ids(&ids)
            .await
            .map_err(|e| FriendError::Internal(e.to_string()))?;

        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            friends.retain(|f| {
                f.username.to_lowercase().contains(&needle) || f.email.to_lowercase().contains(&needle)
            });
        }

        friends.sort_by(|a, b| {
            b.is_online
                .cmp(&a.is_online)
                .then_with(|| a.username.cmp(&b.username))
        });

        let total = friends.len() as i64;
        let items = friends
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(Page::new(items, page, total))
    }

    async fn get_or_create_chat_with(&self, user_id: i64, friend_id: i64) -> Result<PrivateChat, FriendError> {
        if !self.are_friends(user_id, friend_id).await? {
            return Err(FriendError::Forbidden);
        }
        Ok(self.chats.find_or_create(user_id, friend_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::private_chat_service::PrivateChatServiceImpl;
    use crate::config::MessagingSettings;
    use crate::infrastructure::Repositories;
    use pretty_assertions::assert_eq;

    struct Fixture {
        repos: Repositories,
        friends: FriendServiceImpl,
        chats: Arc<PrivateChatServiceImpl>,
    }

    async fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            let user = User::new(id, name, format!("{name}@example.com"));
            repos.users.create(&user).await.unwrap();
        }
        let ids = Arc::new(SnowflakeGenerator::new(1));
        let chats = Arc::new(PrivateChatServiceImpl::new(
            repos.private_chats.clone(),
            repos.messages.clone(),
            repos.users.clone(),
            ids.clone(),
        ));
        let friends = FriendServiceImpl::new(
            repos.friend_requests.clone(),
            repos.users.clone(),
            chats.clone(),
            ids,
        );
        Fixture { repos, friends, chats }
    }

    fn page() -> PageRequest {
        PageRequest::new(None, None, &MessagingSettings::default())
    }

    #[tokio::test]
    async fn test_send_request_validations() {
        let f = fixture().await;
        assert!(matches!(f.friends.send_request(1, 1, None).await, Err(FriendError::SelfRequest)));
        assert!(matches!(f.friends.send_request(1, 99, None).await, Err(FriendError::UserNotFound)));

        let request = f.friends.send_request(1, 2, Some(" hi ".into())).await.unwrap();
        assert_eq!(request.message, "hi");
        assert!(f.friends.exists_pending_between(2, 1).await.unwrap());

        let alice = f.repos.users.find_by_id(1).await.unwrap().unwrap();
        assert!(alice.friend_requests_sent.contains(&request.id));
    }

    #[tokio::test]
    async fn test_reverse_request_while_pending_conflicts() {
        let f = fixture().await;
        f.friends.send_request(1, 2, None).await.unwrap();

        let err = f.friends.send_request(2, 1, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = f.friends.send_request(1, 2, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_accept_links_users_and_opens_one_chat() {
        let f = fixture().await;
        let request = f.friends.send_request(1, 2, Some("hi".into())).await.unwrap();

        let response = f.friends.respond(request.id, 2, Decision::Accept).await.unwrap();
        assert_eq!(response.request.status, FriendRequestStatus::Accepted);
        assert!(response.request.responded_at.is_some());
        let chat = response.chat.unwrap();

        assert!(f.friends.are_friends(1, 2).await.unwrap());
        assert!(f.friends.are_friends(2, 1).await.unwrap());
        assert_eq!(f.chats.find_or_create(1, 2).await.unwrap().id, chat.id);
        assert_eq!(f.friends.get_or_create_chat_with(2, 1).await.unwrap().id, chat.id);

        let err = f.friends.send_request(2, 1, None).await.unwrap_err();
        assert!(matches!(err, FriendError::AlreadyFriends));
    }

    #[tokio::test]
    async fn test_respond_checks_in_order() {
        let f = fixture().await;
        let request = f.friends.send_request(1, 2, None).await.unwrap();

        assert!(matches!(
            f.friends.respond(404, 2, Decision::Accept).await,
            Err(FriendError::RequestNotFound)
        ));
        assert!(matches!(
            f.friends.respond(request.id, 1, Decision::Accept).await,
            Err(FriendError::Forbidden)
        ));

        let declined = f.friends.respond(request.id, 2, Decision::Decline).await.unwrap();
        assert_eq!(declined.request.status, FriendRequestStatus::Declined);
        assert!(declined.chat.is_none());

        let err = f.friends.respond(request.id, 2, Decision::Accept).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!f.friends.are_friends(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_is_sender_only() {
        let f = fixture().await;
        let request = f.friends.send_request(1, 2, None).await.unwrap();

        assert!(matches!(f.friends.cancel(request.id, 2).await, Err(FriendError::Forbidden)));
        let cancelled = f.friends.cancel(request.id, 1).await.unwrap();
        assert_eq!(cancelled.status, FriendRequestStatus::Cancelled);
        assert!(matches!(f.friends.cancel(request.id, 1).await, Err(FriendError::NotPending)));

        // A fresh request is allowed once nothing is pending
        f.friends.send_request(2, 1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_friend_replaces_chat_on_refriend() {
        let f = fixture().await;
        let request = f.friends.send_request(1, 2, None).await.unwrap();
        let chat = f.friends.respond(request.id, 2, Decision::Accept).await.unwrap().chat.unwrap();

        let deactivated = f.friends.remove_friend(2, 1).await.unwrap().unwrap();
        assert_eq!(deactivated.id, chat.id);
        assert!(!deactivated.is_active);
        assert!(!f.friends.are_friends(1, 2).await.unwrap());
        assert!(matches!(f.friends.remove_friend(1, 2).await, Err(FriendError::NotFriends)));
        assert!(matches!(
            f.friends.get_or_create_chat_with(1, 2).await,
            Err(FriendError::Forbidden)
        ));

        let again = f.friends.send_request(2, 1, None).await.unwrap();
        let fresh = f.friends.respond(again.id, 1, Decision::Accept).await.unwrap().chat.unwrap();
        assert_ne!(fresh.id, chat.id);
    }

    #[tokio::test]
    async fn test_lists_carry_counterparts() {
        let f = fixture().await;
        f.friends.send_request(1, 2, None).await.unwrap();
        f.friends.send_request(3, 2, None).await.unwrap();

        let received = f.friends.list_received(2, FriendRequestStatus::Pending, page()).await.unwrap();
        assert_eq!(received.pagination.total, 2);
        let names: Vec<_> = received
            .items
            .iter()
            .map(|v| v.counterpart.as_ref().unwrap().username.clone())
            .collect();
        assert!(names.contains(&"alice".to_string()));
        assert!(names.contains(&"carol".to_string()));

        let sent = f.friends.list_sent(1, FriendRequestStatus::Pending, page()).await.unwrap();
        assert_eq!(sent.items.len(), 1);
        assert_eq!(sent.items[0].counterpart.as_ref().unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_list_friends_orders_online_first_and_filters() {
        let f = fixture().await;
        for other in [1, 3] {
            let request = f.friends.send_request(other, 2, None).await.unwrap();
            f.friends.respond(request.id, 2, Decision::Accept).await.unwrap();
        }
        f.repos.users.bind_connection(3, "conn-carol").await.unwrap();

        let listed = f.friends.list_friends(2, page(), None).await.unwrap();
        let names: Vec<_> = listed.items.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice"]);

        let filtered = f.friends.list_friends(2, page(), Some("ALI")).await.unwrap();
        assert_eq!(filtered.pagination.total, 1);
        assert_eq!(filtered.items[0].username, "alice");
    }
}
