//! Message entity and repository trait.
//!
//! Maps to the `messages` table and its `message_reads` receipts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Message content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        Self::try_from(s).unwrap_or_default()
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// Client-supplied type names. Anything outside the closed set is rejected.
impl TryFrom<&str> for MessageType {
    type Error = AppError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "system" => Ok(Self::System),
            _ => Err(AppError::Validation(format!("Unknown message type: {}", s))),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery progress. Only ever moves forward: `sent -> delivered -> read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            _ => Self::Sent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

/// Where a message lives. Exactly one destination, never both, never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum MessageTarget {
    Room(i64),
    PrivateChat(i64),
}

impl MessageTarget {
    /// Build a target from the two nullable references a stored row carries.
    pub fn from_parts(room_id: Option<i64>, private_chat_id: Option<i64>) -> Result<Self, AppError> {
        match (room_id, private_chat_id) {
            (Some(room), None) => Ok(Self::Room(room)),
            (None, Some(chat)) => Ok(Self::PrivateChat(chat)),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "Message cannot belong to both a chat room and a private chat".into(),
            )),
            (None, None) => Err(AppError::Validation(
                "Message must belong to either a chat room or a private chat".into(),
            )),
        }
    }

    pub fn room_id(&self) -> Option<i64> {
        match self {
            Self::Room(id) => Some(*id),
            Self::PrivateChat(_) => None,
        }
    }

    pub fn private_chat_id(&self) -> Option<i64> {
        match self {
            Self::Room(_) => None,
            Self::PrivateChat(id) => Some(*id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Room(_) => "room",
            Self::PrivateChat(_) => "private_chat",
        }
    }
}

/// A (reader, read-at) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

/// A message sent to a room or a private chat.
///
/// Immutable after creation except for read tracking and edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Snowflake ID (primary key)
    pub id: i64,

    pub content: String,

    pub sender_id: i64,

    pub target: MessageTarget,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub delivery_status: DeliveryStatus,

    pub read_by: Vec<ReadReceipt>,

    /// ID of the message being replied to, always in the same destination
    pub reply_to_id: Option<i64>,

    pub is_edited: bool,

    pub edited_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: i64,
        sender_id: i64,
        target: MessageTarget,
        content: impl Into<String>,
        message_type: MessageType,
        reply_to_id: Option<i64>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            sender_id,
            target,
            message_type,
            delivery_status: DeliveryStatus::Sent,
            read_by: Vec::new(),
            reply_to_id,
            is_edited: false,
            edited_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_read_by(&self, user_id: i64) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// `sent -> delivered`. Returns `true` if the status changed.
    pub fn mark_delivered(&mut self) -> bool {
        if self.delivery_status == DeliveryStatus::Sent {
            self.delivery_status = DeliveryStatus::Delivered;
            return true;
        }
        false
    }

    /// Record a read receipt. Returns `true` if a receipt was appended.
    ///
    /// The first receipt on a `delivered` message advances it to `read`;
    /// later readers never re-trigger the transition and `sent` is left as is.
    pub fn mark_read(&mut self, reader_id: i64, at: DateTime<Utc>) -> bool {
        if self.is_read_by(reader_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id: reader_id,
            read_at: at,
        });
        if self.delivery_status == DeliveryStatus::Delivered {
            self.delivery_status = DeliveryStatus::Read;
        }
        true
    }

    pub fn edit(&mut self, content: impl Into<String>, at: DateTime<Utc>) {
        self.content = content.into();
        self.is_edited = true;
        self.edited_at = Some(at);
    }

    /// Get the content length in characters.
    pub fn content_length(&self) -> usize {
        self.content.chars().count()
    }
}

/// Repository trait for Message data access operations.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    async fn create(&self, message: &Message) -> Result<Message, AppError>;

    /// Messages in a destination, newest first, offset-paginated.
    async fn find_by_target(
        &self,
        target: MessageTarget,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError>;

    async fn count_by_target(&self, target: MessageTarget) -> Result<i64, AppError>;

    /// Apply [`Message::mark_read`] atomically. `None` if the message is gone.
    async fn record_read(
        &self,
        id: i64,
        reader_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<(Message, bool)>, AppError>;

    /// Apply [`Message::mark_delivered`] atomically. Returns `true` if the
    /// status changed.
    async fn mark_delivered(&self, id: i64) -> Result<bool, AppError>;

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>, AppError>;

    /// Messages in a private chat not authored by `reader_id` and created
    /// strictly after `after` (all of them when `after` is `None`).
    async fn count_unread(
        &self,
        private_chat_id: i64,
        reader_id: i64,
        after: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn message() -> Message {
        Message::new(1, 10, MessageTarget::Room(5), "hello", MessageType::Text, None)
    }

    #[test]
    fn test_target_rejects_both_destinations() {
        let err = MessageTarget::from_parts(Some(1), Some(2)).unwrap_err();
        assert_eq!(err.kind(), crate::shared::error::ErrorKind::ValidationFailed);
    }

    #[test]
    fn test_target_rejects_no_destination() {
        let err = MessageTarget::from_parts(None, None).unwrap_err();
        assert_eq!(err.kind(), crate::shared::error::ErrorKind::ValidationFailed);
    }

    #[test]
    fn test_target_from_single_destination() {
        assert_eq!(
            MessageTarget::from_parts(Some(3), None).unwrap(),
            MessageTarget::Room(3)
        );
        assert_eq!(
            MessageTarget::from_parts(None, Some(4)).unwrap(),
            MessageTarget::PrivateChat(4)
        );
    }

    #[test]
    fn test_read_on_sent_message_keeps_status() {
        let mut msg = message();
        assert!(msg.mark_read(20, Utc::now()));
        assert_eq!(msg.delivery_status, DeliveryStatus::Sent);
        assert!(msg.is_read_by(20));
    }

    #[test]
    fn test_first_read_wins() {
        let mut msg = message();
        assert!(msg.mark_delivered());
        assert!(!msg.mark_delivered());

        assert!(msg.mark_read(20, Utc::now()));
        assert_eq!(msg.delivery_status, DeliveryStatus::Read);

        assert!(msg.mark_read(30, Utc::now()));
        assert!(!msg.mark_read(20, Utc::now()));
        assert_eq!(msg.read_by.len(), 2);
        assert_eq!(msg.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn test_read_message_never_regresses_to_delivered() {
        let mut msg = message();
        msg.mark_delivered();
        msg.mark_read(20, Utc::now());
        assert!(!msg.mark_delivered());
        assert_eq!(msg.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn test_edit_sets_flags() {
        let mut msg = message();
        let at = Utc::now();
        msg.edit("changed", at);
        assert_eq!(msg.content, "changed");
        assert!(msg.is_edited);
        assert_eq!(msg.edited_at, Some(at));
    }

    #[test_case("text", MessageType::Text)]
    #[test_case("IMAGE", MessageType::Image)]
    #[test_case("file", MessageType::File)]
    #[test_case("system", MessageType::System)]
    #[test_case("unknown", MessageType::Text)]
    fn test_message_type_from_str(input: &str, expected: MessageType) {
        assert_eq!(MessageType::from_str(input), expected);
    }

    #[test_case("image" => Some(MessageType::Image))]
    #[test_case("Text" => Some(MessageType::Text))]
    #[test_case("video" => None)]
    #[test_case("" => None)]
    fn test_message_type_try_from(input: &str) -> Option<MessageType> {
        match MessageType::try_from(input) {
            Ok(kind) => Some(kind),
            Err(err) => {
                assert_eq!(err.kind(), crate::shared::error::ErrorKind::ValidationFailed);
                None
            }
        }
    }
}
