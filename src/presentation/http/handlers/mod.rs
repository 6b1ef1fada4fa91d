//! HTTP Handlers
//!
//! Request handlers for all HTTP endpoints.

pub mod friend;
pub mod health;
pub mod message;
pub mod private_chat;
pub mod room;
pub mod user;
