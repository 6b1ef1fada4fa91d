//! ChatRoom entity and repository trait.
//!
//! Maps to the `chat_rooms` table and its `chat_room_participants` rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Who can discover a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Public,
    Private,
}

impl RoomVisibility {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "private" => Self::Private,
            _ => Self::Public,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    #[default]
    Member,
}

impl ParticipantRole {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

/// A user's membership entry in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: i64,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

/// A group chat room.
///
/// Participant user ids are unique within a room; `participants` keeps join
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub visibility: RoomVisibility,
    pub participants: Vec<Participant>,
    pub created_by: i64,
    pub last_message_id: Option<i64>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// Create a room whose creator is its only participant, as admin.
    pub fn new(
        id: i64,
        created_by: i64,
        name: impl Into<String>,
        description: Option<String>,
        visibility: RoomVisibility,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description,
            visibility,
            participants: vec![Participant {
                user_id: created_by,
                role: ParticipantRole::Admin,
                joined_at: now,
            }],
            created_by,
            last_message_id: None,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: i64) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn role_of(&self, user_id: i64) -> Option<ParticipantRole> {
        self.participants
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.role)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == RoomVisibility::Public
    }

    /// Append a participant. Returns `false` if the user is already present.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.is_participant(participant.user_id) {
            return false;
        }
        self.updated_at = participant.joined_at;
        self.participants.push(participant);
        true
    }

    /// Remove a participant. Returns `false` if the user was not present.
    pub fn remove_participant(&mut self, user_id: i64) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        let removed = self.participants.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Record activity, optionally pointing at the newest message.
    pub fn touch(&mut self, last_message_id: Option<i64>, at: DateTime<Utc>) {
        if last_message_id.is_some() {
            self.last_message_id = last_message_id;
        }
        self.last_activity = at;
        self.updated_at = at;
    }
}

/// Outcome of a participant change applied by the store.
#[derive(Debug, Clone)]
pub enum MembershipUpdate {
    /// The change was applied; carries the updated room.
    Applied(ChatRoom),
    /// The room already was in the requested state.
    Unchanged(ChatRoom),
    RoomNotFound,
}

/// Repository trait for ChatRoom data access operations.
///
/// Participant changes also maintain `User::joined_rooms` in the same
/// atomic store operation.
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError>;

    /// Persist a new room and add it to the creator's joined rooms.
    async fn create(&self, room: &ChatRoom) -> Result<ChatRoom, AppError>;

    async fn add_participant(
        &self,
        room_id: i64,
        participant: &Participant,
    ) -> Result<MembershipUpdate, AppError>;

    async fn remove_participant(
        &self,
        room_id: i64,
        user_id: i64,
    ) -> Result<MembershipUpdate, AppError>;

    /// Rooms the user participates in, most recently active first.
    async fn find_by_participant(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError>;

    /// Public rooms, most recently active first.
    async fn find_public(&self, limit: i64, offset: i64) -> Result<Vec<ChatRoom>, AppError>;

    /// Update last activity (and last message, when given). Returns `false`
    /// if the room does not exist.
    async fn touch(
        &self,
        room_id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn room() -> ChatRoom {
        ChatRoom::new(10, 1, "general", None, RoomVisibility::Public)
    }

    #[test]
    fn test_creator_is_sole_admin() {
        let room = room();
        assert_eq!(room.participant_count(), 1);
        assert_eq!(room.role_of(1), Some(ParticipantRole::Admin));
        assert!(room.is_participant(1));
        assert!(!room.is_participant(2));
    }

    #[test]
    fn test_add_participant_is_unique() {
        let mut room = room();
        let entry = Participant {
            user_id: 2,
            role: ParticipantRole::Member,
            joined_at: Utc::now(),
        };
        assert!(room.add_participant(entry.clone()));
        assert!(!room.add_participant(entry));
        assert_eq!(room.participant_count(), 2);
        assert_eq!(room.role_of(2), Some(ParticipantRole::Member));
    }

    #[test]
    fn test_remove_participant() {
        let mut room = room();
        assert!(room.remove_participant(1));
        assert!(!room.remove_participant(1));
        assert_eq!(room.participant_count(), 0);
    }

    #[test]
    fn test_touch_keeps_last_message_when_none() {
        let mut room = room();
        let at = Utc::now();
        room.touch(Some(99), at);
        room.touch(None, at);
        assert_eq!(room.last_message_id, Some(99));
        assert_eq!(room.last_activity, at);
    }

    #[test_case("public", RoomVisibility::Public)]
    #[test_case("PRIVATE", RoomVisibility::Private)]
    #[test_case("other", RoomVisibility::Public)]
    fn test_visibility_from_str(input: &str, expected: RoomVisibility) {
        assert_eq!(RoomVisibility::from_str(input), expected);
    }
}
