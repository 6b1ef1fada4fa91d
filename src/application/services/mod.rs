//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **UserService**: Registration and profile lookups
//! - **FriendService**: Friend request state machine and friend graph
//! - **PrivateChatService**: 1:1 chat resolution, read cursors, unread counts
//! - **RoomService**: Group room membership
//! - **MessageService**: Message pipeline and read receipts

pub mod friend_service;
pub mod message_service;
pub mod private_chat_service;
pub mod room_service;
pub mod user_service;

use std::sync::Arc;

use crate::config::MessagingSettings;
use crate::infrastructure::Repositories;
use crate::shared::snowflake::SnowflakeGenerator;

pub use friend_service::{
    Decision, FriendError, FriendRequestView, FriendResponse, FriendService, FriendServiceImpl,
};
pub use message_service::{
    MessageError, MessageHistory, MessageService, MessageServiceImpl, ReadOutcome,
};
pub use private_chat_service::{
    other_participant, PrivateChatError, PrivateChatService, PrivateChatServiceImpl,
    PrivateChatSummary,
};
pub use room_service::{CreateRoomDto, RoomError, RoomService, RoomServiceImpl};
pub use user_service::{UserError, UserService, UserServiceImpl};

/// Every service, wired over one set of repositories.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserService>,
    pub friends: Arc<dyn FriendService>,
    pub private_chats: Arc<dyn PrivateChatService>,
    pub rooms: Arc<dyn RoomService>,
    pub messages: Arc<dyn MessageService>,
}

impl Services {
    pub fn new(
        repos: &Repositories,
        id_generator: Arc<SnowflakeGenerator>,
        limits: MessagingSettings,
    ) -> Self {
        let private_chats: Arc<dyn PrivateChatService> = Arc::new(PrivateChatServiceImpl::new(
            repos.private_chats.clone(),
            repos.messages.clone(),
            repos.users.clone(),
            id_generator.clone(),
        ));
        let rooms: Arc<dyn RoomService> = Arc::new(RoomServiceImpl::new(
            repos.rooms.clone(),
            repos.messages.clone(),
            id_generator.clone(),
        ));

        Self {
            users: Arc::new(UserServiceImpl::new(repos.users.clone(), id_generator.clone())),
            friends: Arc::new(FriendServiceImpl::new(
                repos.friend_requests.clone(),
                repos.users.clone(),
                private_chats.clone(),
                id_generator.clone(),
            )),
            messages: Arc::new(MessageServiceImpl::new(
                repos.messages.clone(),
                rooms.clone(),
                private_chats.clone(),
                id_generator,
                limits,
            )),
            private_chats,
            rooms,
        }
    }
}
