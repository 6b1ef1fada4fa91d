use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{paginate, MemoryStore, Tables};
use crate::domain::{
    AcceptOutcome, CanonicalPair, FriendRequest, FriendRequestRepository, FriendRequestStatus,
    FriendshipRemoval, PrivateChat, TransitionOutcome,
};
use crate::shared::error::AppError;

impl Tables {
    fn pending_between(&self, pair: &CanonicalPair) -> Option<&FriendRequest> {
        self.friend_requests.values().find(|r| {
            r.is_pending() && pair.contains(r.sender_id) && pair.contains(r.receiver_id)
        })
    }

    fn link_friends(&mut self, a: i64, b: i64) {
        if let Some(user) = self.users.get_mut(&a) {
            user.friends.insert(b);
        }
        if let Some(user) = self.users.get_mut(&b) {
            user.friends.insert(a);
        }
    }

    fn sorted_requests<F>(&self, filter: F) -> Vec<FriendRequest>
    where
        F: Fn(&FriendRequest) -> bool,
    {
        let mut requests: Vec<FriendRequest> =
            self.friend_requests.values().filter(|&r| filter(r)).cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        requests
    }
}

#[async_trait]
impl FriendRequestRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<FriendRequest>, AppError> {
        Ok(self.tables.read().friend_requests.get(&id).cloned())
    }

    async fn find_pending_between(&self, a: i64, b: i64) -> Result<Option<FriendRequest>, AppError> {
        let pair = CanonicalPair::new(a, b)?;
        Ok(self.tables.read().pending_between(&pair).cloned())
    }

    async fn create_pending(&self, request: &FriendRequest) -> Result<Option<FriendRequest>, AppError> {
        let pair = request.pair()?;
        let mut tables = self.tables.write();
        if tables.pending_between(&pair).is_some() {
            return Ok(None);
        }
        tables.friend_requests.insert(request.id, request.clone());
        if let Some(sender) = tables.users.get_mut(&request.sender_id) {
            sender.friend_requests_sent.insert(request.id);
        }
        if let Some(receiver) = tables.users.get_mut(&request.receiver_id) {
            receiver.friend_requests_received.insert(request.id);
        }
        Ok(Some(request.clone()))
    }

    async fn transition(
        &self,
        id: i64,
        to: FriendRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let mut tables = self.tables.write();
        let Some(request) = tables.friend_requests.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !request.is_pending() {
            return Ok(TransitionOutcome::NotPending(request.clone()));
        }
        request.transition(to, at)?;
        Ok(TransitionOutcome::Applied(request.clone()))
    }

    async fn accept(
        &self,
        id: i64,
        at: DateTime<Utc>,
        chat_candidate: &PrivateChat,
    ) -> Result<AcceptOutcome, AppError> {
        let mut tables = self.tables.write();
        let Some(request) = tables.friend_requests.get(&id).cloned() else {
            return Ok(AcceptOutcome::NotFound);
        };
        if !request.is_pending() {
            return Ok(AcceptOutcome::NotPending(request));
        }
        if request.pair()? != chat_candidate.participants {
            return Err(AppError::Internal(
                "Chat candidate does not match the request's users".into(),
            ));
        }

        let mut accepted = request;
        accepted.transition(FriendRequestStatus::Accepted, at)?;
        tables.friend_requests.insert(id, accepted.clone());
        tables.link_friends(accepted.sender_id, accepted.receiver_id);
        let chat = tables.insert_active_or_get(chat_candidate);

        Ok(AcceptOutcome::Accepted {
            request: accepted,
            chat,
        })
    }

    async fn remove_friendship(&self, a: i64, b: i64) -> Result<FriendshipRemoval, AppError> {
        let pair = CanonicalPair::new(a, b)?;
        let mut tables = self.tables.write();
        let linked = tables.users.get(&a).is_some_and(|u| u.is_friend(b));
        if !linked {
            return Ok(FriendshipRemoval::NotFriends);
        }
        if let Some(user) = tables.users.get_mut(&a) {
            user.friends.remove(&b);
        }
        if let Some(user) = tables.users.get_mut(&b) {
            user.friends.remove(&a);
        }
        let deactivated_chat = tables
            .active_chat_id(&pair)
            .and_then(|chat_id| tables.private_chats.get_mut(&chat_id))
            .map(|chat| {
                chat.deactivate();
                chat.clone()
            });
        Ok(FriendshipRemoval::Removed { deactivated_chat })
    }

    async fn find_by_receiver(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError> {
        let requests = self
            .tables
            .read()
            .sorted_requests(|r| r.receiver_id == user_id && r.status == status);
        Ok(paginate(requests, limit, offset))
    }

    async fn count_by_receiver(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
    ) -> Result<i64, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .friend_requests
            .values()
            .filter(|r| r.receiver_id == user_id && r.status == status)
            .count() as i64)
    }

    async fn find_by_sender(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FriendRequest>, AppError> {
        let requests = self
            .tables
            .read()
            .sorted_requests(|r| r.sender_id == user_id && r.status == status);
        Ok(paginate(requests, limit, offset))
    }

    async fn count_by_sender(
        &self,
        user_id: i64,
        status: FriendRequestStatus,
    ) -> Result<i64, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .friend_requests
            .values()
            .filter(|r| r.sender_id == user_id && r.status == status)
            .count() as i64)
    }
}
