//! Repository Implementations
//!
//! PostgreSQL implementations of the domain repository traits.
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use social_chat::infrastructure::repositories::{PgUserRepository, PgMessageRepository};
//!
//! async fn setup(pool: PgPool) {
//!     let users = PgUserRepository::new(pool.clone());
//!     let messages = PgMessageRepository::new(pool);
//! }
//! ```

pub mod chat_room_repository;
pub mod friend_request_repository;
pub mod message_repository;
pub mod private_chat_repository;
pub mod user_repository;

pub use chat_room_repository::PgChatRoomRepository;
pub use friend_request_repository::PgFriendRequestRepository;
pub use message_repository::PgMessageRepository;
pub use private_chat_repository::PgPrivateChatRepository;
pub use user_repository::PgUserRepository;
