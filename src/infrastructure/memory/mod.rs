//! In-memory store.
//!
//! A process-local implementation of every repository trait. All tables sit
//! behind a single `RwLock`, so each repository call, including the ones that
//! touch several entities (accept, remove friend, room membership), runs
//! under one write guard and is atomic with respect to every other call.
//!
//! Used by the test suite and by `database.backend = "memory"`.

mod chat_rooms;
mod friend_requests;
mod messages;
mod private_chats;
mod users;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::{ChatRoom, FriendRequest, Message, PrivateChat, User};

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub users: HashMap<i64, User>,
    pub rooms: HashMap<i64, ChatRoom>,
    pub messages: HashMap<i64, Message>,
    pub private_chats: HashMap<i64, PrivateChat>,
    pub friend_requests: HashMap<i64, FriendRequest>,
}

/// Shared handle to the in-memory tables. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply offset pagination to an already sorted list.
pub(crate) fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}
