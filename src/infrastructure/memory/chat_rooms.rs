use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{paginate, MemoryStore};
use crate::domain::{ChatRoom, ChatRoomRepository, MembershipUpdate, Participant};
use crate::shared::error::AppError;

#[async_trait]
impl ChatRoomRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError> {
        Ok(self.tables.read().rooms.get(&id).cloned())
    }

    async fn create(&self, room: &ChatRoom) -> Result<ChatRoom, AppError> {
        let mut tables = self.tables.write();
        if tables.rooms.contains_key(&room.id) {
            return Err(AppError::Conflict(format!("Room {} already exists", room.id)));
        }
        for participant in &room.participants {
            if let Some(user) = tables.users.get_mut(&participant.user_id) {
                user.joined_rooms.insert(room.id);
            }
        }
        tables.rooms.insert(room.id, room.clone());
        Ok(room.clone())
    }

    async fn add_participant(
        &self,
        room_id: i64,
        participant: &Participant,
    ) -> Result<MembershipUpdate, AppError> {
        let mut tables = self.tables.write();
        let Some(room) = tables.rooms.get_mut(&room_id) else {
            return Ok(MembershipUpdate::RoomNotFound);
        };
        if !room.add_participant(participant.clone()) {
            return Ok(MembershipUpdate::Unchanged(room.clone()));
        }
        let updated = room.clone();
        if let Some(user) = tables.users.get_mut(&participant.user_id) {
            user.joined_rooms.insert(room_id);
        }
        Ok(MembershipUpdate::Applied(updated))
    }

    async fn remove_participant(
        &self,
        room_id: i64,
        user_id: i64,
    ) -> Result<MembershipUpdate, AppError> {
        let mut tables = self.tables.write();
        let Some(room) = tables.rooms.get_mut(&room_id) else {
            return Ok(MembershipUpdate::RoomNotFound);
        };
        if !room.remove_participant(user_id) {
            return Ok(MembershipUpdate::Unchanged(room.clone()));
        }
        let updated = room.clone();
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.joined_rooms.remove(&room_id);
        }
        Ok(MembershipUpdate::Applied(updated))
    }

    async fn find_by_participant(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError> {
        let tables = self.tables.read();
        let mut rooms: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|r| r.is_participant(user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(b.id.cmp(&a.id)));
        Ok(rooms)
    }

    async fn find_public(&self, limit: i64, offset: i64) -> Result<Vec<ChatRoom>, AppError> {
        let tables = self.tables.read();
        let mut rooms: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|r| r.is_public())
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(b.id.cmp(&a.id)));
        Ok(paginate(rooms, limit, offset))
    }

    async fn touch(
        &self,
        room_id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write();
        match tables.rooms.get_mut(&room_id) {
            Some(room) => {
                room.touch(last_message_id, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParticipantRole, RoomVisibility, User, UserRepository};

    #[tokio::test]
    async fn test_membership_keeps_joined_rooms_in_sync() {
        let store = MemoryStore::new();
        let users: &dyn UserRepository = &store;
        let rooms: &dyn ChatRoomRepository = &store;
        users.create(&User::new(1, "alice", "a@example.com")).await.unwrap();
        users.create(&User::new(2, "bob", "b@example.com")).await.unwrap();

        rooms
            .create(&ChatRoom::new(10, 1, "general", None, RoomVisibility::Public))
            .await
            .unwrap();
        assert!(users.find_by_id(1).await.unwrap().unwrap().joined_rooms.contains(&10));

        let entry = Participant {
            user_id: 2,
            role: ParticipantRole::Member,
            joined_at: Utc::now(),
        };
        assert!(matches!(
            rooms.add_participant(10, &entry).await.unwrap(),
            MembershipUpdate::Applied(_)
        ));
        assert!(matches!(
            rooms.add_participant(10, &entry).await.unwrap(),
            MembershipUpdate::Unchanged(_)
        ));
        assert!(users.find_by_id(2).await.unwrap().unwrap().joined_rooms.contains(&10));

        rooms.remove_participant(10, 2).await.unwrap();
        assert!(users.find_by_id(2).await.unwrap().unwrap().joined_rooms.is_empty());
        assert!(matches!(
            rooms.remove_participant(99, 2).await.unwrap(),
            MembershipUpdate::RoomNotFound
        ));
    }
}
