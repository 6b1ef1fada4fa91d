//! Request DTOs
//!
//! Data structures for API request bodies and query strings. Ids travel as
//! strings, as snowflakes overflow JavaScript numbers.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{FriendRequestStatus, RoomVisibility};

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Send friend request
#[derive(Debug, Deserialize, Validate)]
pub struct SendFriendRequestRequest {
    pub receiver_id: String,

    #[validate(length(max = 200, message = "Message must be at most 200 characters"))]
    pub message: Option<String>,
}

/// Create room request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,

    #[validate(length(max = 200, message = "Description must be at most 200 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub visibility: RoomVisibility,
}

/// Send message request
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Message content cannot be empty"))]
    pub content: String,

    #[serde(rename = "type")]
    pub message_type: Option<String>,

    pub reply_to: Option<String>,
}

/// Edit message request
#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, message = "Message content cannot be empty"))]
    pub content: String,
}

/// Mark a private chat read up to a message (defaults to the last one)
#[derive(Debug, Default, Deserialize)]
pub struct MarkChatReadRequest {
    pub message_id: Option<String>,
}

/// Page query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Friend request listing query
#[derive(Debug, Default, Deserialize)]
pub struct FriendRequestQuery {
    pub status: Option<FriendRequestStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Friend listing query
#[derive(Debug, Default, Deserialize)]
pub struct FriendsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Online users query
#[derive(Debug, Default, Deserialize)]
pub struct OnlineQuery {
    pub limit: Option<i64>,
}
