//! # Domain Layer
//!
//! Entities, value objects and repository contracts. Nothing here knows
//! about HTTP, WebSockets or a concrete database.
//!
//! - **entities**: User, ChatRoom, Message, PrivateChat, FriendRequest
//! - **value_objects**: `CanonicalPair`

pub mod entities;
pub mod value_objects;

pub use entities::*;
pub use value_objects::*;
