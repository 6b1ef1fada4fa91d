//! # Domain Entities
//!
//! Core domain entities of the social chat backend. Every entity maps to a
//! table in the Postgres schema and is also held by the in-memory store.
//!
//! - **User**: account, presence binding and derived friend/room caches
//! - **ChatRoom**: group conversation with admin/member participants
//! - **Message**: content addressed to exactly one room or private chat
//! - **PrivateChat**: 1:1 conversation keyed by a canonical user pair
//! - **FriendRequest**: the pending/accepted/declined/cancelled state machine
//!
//! Each entity has a repository trait implemented in the infrastructure layer.

mod chat_room;
mod friend_request;
mod message;
mod private_chat;
mod user;

pub use chat_room::{
    ChatRoom, ChatRoomRepository, MembershipUpdate, Participant, ParticipantRole, RoomVisibility,
};
pub use friend_request::{
    AcceptOutcome, FriendRequest, FriendRequestRepository, FriendRequestStatus, FriendshipRemoval,
    TransitionOutcome,
};
pub use message::{
    DeliveryStatus, Message, MessageRepository, MessageTarget, MessageType, ReadReceipt,
};
pub use private_chat::{PrivateChat, PrivateChatRepository, ReadCursor};
pub use user::{User, UserRepository};
