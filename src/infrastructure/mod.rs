//! Infrastructure Layer
//!
//! Implementations of the domain repository traits and other external
//! concerns:
//! - `database`: PostgreSQL pool and migrations
//! - `repositories`: PostgreSQL repositories
//! - `memory`: in-process store for tests and single-node runs
//! - `metrics`: Prometheus registry

pub mod database;
pub mod memory;
pub mod metrics;
pub mod repositories;

use std::sync::Arc;

use sqlx::PgPool;

use crate::domain::{
    ChatRoomRepository, FriendRequestRepository, MessageRepository, PrivateChatRepository,
    UserRepository,
};
use memory::MemoryStore;
use repositories::{
    PgChatRoomRepository, PgFriendRequestRepository, PgMessageRepository,
    PgPrivateChatRepository, PgUserRepository,
};

/// One handle per repository trait, all backed by the same store.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub private_chats: Arc<dyn PrivateChatRepository>,
    pub friend_requests: Arc<dyn FriendRequestRepository>,
}

impl Repositories {
    /// Repositories sharing a fresh in-memory store.
    pub fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            users: Arc::new(store.clone()),
            rooms: Arc::new(store.clone()),
            messages: Arc::new(store.clone()),
            private_chats: Arc::new(store.clone()),
            friend_requests: Arc::new(store),
        }
    }

    /// Repositories backed by PostgreSQL.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            rooms: Arc::new(PgChatRoomRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            private_chats: Arc::new(PgPrivateChatRepository::new(pool.clone())),
            friend_requests: Arc::new(PgFriendRequestRepository::new(pool)),
        }
    }
}
