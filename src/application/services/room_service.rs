//! Room Service
//!
//! Group room membership and participant checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::message_service::MessageHistory;
use crate::application::pagination::PageRequest;
use crate::domain::{
    ChatRoom, ChatRoomRepository, MembershipUpdate, MessageRepository, MessageTarget, Participant,
    ParticipantRole, RoomVisibility,
};
use crate::shared::error::{AppError, ErrorKind};
use crate::shared::snowflake::SnowflakeGenerator;

/// Create room request
#[derive(Debug, Clone)]
pub struct CreateRoomDto {
    pub name: String,
    pub description: Option<String>,
    pub visibility: RoomVisibility,
}

/// Room service trait
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Create a room; the creator becomes its only participant, as admin.
    async fn create(&self, creator_id: i64, request: CreateRoomDto) -> Result<ChatRoom, RoomError>;

    async fn join(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError>;

    async fn leave(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError>;

    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, RoomError>;

    /// Load a room the caller participates in.
    async fn get_participating(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>, RoomError>;

    async fn list_public(&self, page: PageRequest) -> Result<Vec<ChatRoom>, RoomError>;

    /// Record activity in a room, pointing it at its newest message.
    async fn touch_activity(&self, room_id: i64, message_id: Option<i64>) -> Result<(), RoomError>;

    /// A chronological page of history, participants only.
    async fn messages(&self, room_id: i64, user_id: i64, page: PageRequest) -> Result<MessageHistory, RoomError>;
}

/// Room service errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Chat room not found")]
    NotFound,

    #[error("Room name must not be empty")]
    InvalidName,

    #[error("Already a member of this room")]
    AlreadyMember,

    #[error("Not a member of this room")]
    NotMember,

    #[error("Access denied to this room")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::NotFound => ErrorKind::NotFound,
            RoomError::InvalidName => ErrorKind::ValidationFailed,
            RoomError::AlreadyMember => ErrorKind::Conflict,
            RoomError::NotMember => ErrorKind::InvalidState,
            RoomError::Forbidden => ErrorKind::Forbidden,
            RoomError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<RoomError> for AppError {
    fn from(err: RoomError) -> Self {
        AppError::from_kind(err.kind(), err.to_string())
    }
}

/// RoomService implementation
pub struct RoomServiceImpl {
    room_repo: Arc<dyn ChatRoomRepository>,
    message_repo: Arc<dyn MessageRepository>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl RoomServiceImpl {
    pub fn new(
        room_repo: Arc<dyn ChatRoomRepository>,
        message_repo: Arc<dyn MessageRepository>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            room_repo,
            message_repo,
            id_generator,
        }
    }

    async fn find(&self, room_id: i64) -> Result<ChatRoom, RoomError> {
        self.room_repo
            .find_by_id(room_id)
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?
            .ok_or(RoomError::NotFound)
    }
}

#[async_trait]
impl RoomService for RoomServiceImpl {
    async fn create(&self, creator_id: i64, request: CreateRoomDto) -> Result<ChatRoom, RoomError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidName);
        }
        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let room = ChatRoom::new(
            self.id_generator.generate(),
            creator_id,
            name,
            description,
            request.visibility,
        );

        let created = self
            .room_repo
            .create(&room)
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?;

        info!(room_id = created.id, user_id = creator_id, name = %created.name, "Room created");
        Ok(created)
    }

    async fn join(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError> {
        let participant = Participant {
            user_id,
            role: ParticipantRole::Member,
            joined_at: Utc::now(),
        };

        match self
            .room_repo
            .add_participant(room_id, &participant)
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?
        {
            MembershipUpdate::Applied(room) => {
                info!(room_id, user_id, "User joined room");
                Ok(room)
            }
            MembershipUpdate::Unchanged(_) => Err(RoomError::AlreadyMember),
            MembershipUpdate::RoomNotFound => Err(RoomError::NotFound),
        }
    }

    async fn leave(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError> {
        match self
            .room_repo
            .remove_participant(room_id, user_id)
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?
        {
            MembershipUpdate::Applied(room) => {
                info!(room_id, user_id, "User left room");
                Ok(room)
            }
            MembershipUpdate::Unchanged(_) => Err(RoomError::NotMember),
            MembershipUpdate::RoomNotFound => Err(RoomError::NotFound),
        }
    }

    async fn is_participant(&self, room_id: i64, user_id: i64) -> Result<bool, RoomError> {
        Ok(self.find(room_id).await?.is_participant(user_id))
    }

    async fn get_participating(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, RoomError> {
        let room = self.find(room_id).await?;
        if !room.is_participant(user_id) {
            return Err(RoomError::Forbidden);
        }
        Ok(room)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>, RoomError> {
        self.room_repo
            .find_by_participant(user_id)
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))
    }

    async fn list_public(&self, page: PageRequest) -> Result<Vec<ChatRoom>, RoomError> {
        self.room_repo
            .find_public(page.limit, page.offset())
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))
    }

    async fn touch_activity(&self, room_id: i64, message_id: Option<i64>) -> Result<(), RoomError> {
        let touched = self
            .room_repo
            .touch(room_id, message_id, Utc::now())
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?;
        if !touched {
            return Err(RoomError::NotFound);
        }
        Ok(())
    }

    async fn messages(&self, room_id: i64, user_id: i64, page: PageRequest) -> Result<MessageHistory, RoomError> {
        let room = self.get_participating(room_id, user_id).await?;
        let newest_first = self
            .message_repo
            .find_by_target(MessageTarget::Room(room.id), page.limit, page.offset())
            .await
            .map_err(|e| RoomError::Internal(e.to_string()))?;
        Ok(MessageHistory::from_newest_first(newest_first, page))
    }
}
