//! ChatRoom Repository Implementation
//!
//! PostgreSQL implementation of the ChatRoomRepository trait. Participants
//! live in `chat_room_participants`, which is also the source of
//! `User::joined_rooms`, so membership changes keep both in sync.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{
    ChatRoom, ChatRoomRepository, MembershipUpdate, Participant, ParticipantRole, RoomVisibility,
};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct ChatRoomRow {
    id: i64,
    name: String,
    description: Option<String>,
    visibility: String,
    created_by: i64,
    last_message_id: Option<i64>,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChatRoomRow {
    fn into_room(self, participants: Vec<Participant>) -> ChatRoom {
        ChatRoom {
            id: self.id,
            name: self.name,
            description: self.description,
            visibility: RoomVisibility::from_str(&self.visibility),
            participants,
            created_by: self.created_by,
            last_message_id: self.last_message_id,
            last_activity: self.last_activity,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    room_id: i64,
    user_id: i64,
    role: String,
    joined_at: DateTime<Utc>,
}

const ROOM_COLUMNS: &str = r#"
    id, name, description, visibility, created_by, last_message_id,
    last_activity, created_at, updated_at
"#;

/// Attach participants (in join order) to a batch of room rows.
async fn hydrate(conn: &mut PgConnection, rows: Vec<ChatRoomRow>) -> Result<Vec<ChatRoom>, AppError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let participant_rows = sqlx::query_as::<_, ParticipantRow>(
        r#"
        SELECT room_id, user_id, role, joined_at
        FROM chat_room_participants
        WHERE room_id = ANY($1)
        ORDER BY joined_at, user_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_room: HashMap<i64, Vec<Participant>> = HashMap::new();
    for row in participant_rows {
        by_room.entry(row.room_id).or_default().push(Participant {
            user_id: row.user_id,
            role: ParticipantRole::from_str(&row.role),
            joined_at: row.joined_at,
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let participants = by_room.remove(&row.id).unwrap_or_default();
            row.into_room(participants)
        })
        .collect())
}

async fn fetch_room(conn: &mut PgConnection, id: i64) -> Result<Option<ChatRoom>, AppError> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = $1");
    let row = sqlx::query_as::<_, ChatRoomRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// PostgreSQL chat room repository implementation.
#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_room(&mut conn, id).await
    }

    async fn create(&self, room: &ChatRoom) -> Result<ChatRoom, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, name, description, visibility, created_by,
                                    last_message_id, last_activity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.visibility.as_str())
        .bind(room.created_by)
        .bind(room.last_message_id)
        .bind(room.last_activity)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *tx)
        .await?;

        for participant in &room.participants {
            sqlx::query(
                "INSERT INTO chat_room_participants (room_id, user_id, role, joined_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(room.id)
            .bind(participant.user_id)
            .bind(participant.role.as_str())
            .bind(participant.joined_at)
            .execute(&mut *tx)
            .await?;
        }

        let created = fetch_room(&mut tx, room.id).await?;
        tx.commit().await?;

        created.ok_or_else(|| AppError::Internal(format!("Room {} vanished after insert", room.id)))
    }

    async fn add_participant(
        &self,
        room_id: i64,
        participant: &Participant,
    ) -> Result<MembershipUpdate, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM chat_rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(MembershipUpdate::RoomNotFound);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO chat_room_participants (room_id, user_id, role, joined_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(participant.user_id)
        .bind(participant.role.as_str())
        .bind(participant.joined_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            sqlx::query("UPDATE chat_rooms SET updated_at = $2 WHERE id = $1")
                .bind(room_id)
                .bind(participant.joined_at)
                .execute(&mut *tx)
                .await?;
        }

        let room = fetch_room(&mut tx, room_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Room {room_id} vanished while locked")))?;
        tx.commit().await?;

        Ok(if inserted {
            MembershipUpdate::Applied(room)
        } else {
            MembershipUpdate::Unchanged(room)
        })
    }

    async fn remove_participant(
        &self,
        room_id: i64,
        user_id: i64,
    ) -> Result<MembershipUpdate, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM chat_rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(MembershipUpdate::RoomNotFound);
        }

        let removed = sqlx::query("DELETE FROM chat_room_participants WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            sqlx::query("UPDATE chat_rooms SET updated_at = NOW() WHERE id = $1")
                .bind(room_id)
                .execute(&mut *tx)
                .await?;
        }

        let room = fetch_room(&mut tx, room_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Room {room_id} vanished while locked")))?;
        tx.commit().await?;

        Ok(if removed {
            MembershipUpdate::Applied(room)
        } else {
            MembershipUpdate::Unchanged(room)
        })
    }

    async fn find_by_participant(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            r#"
            SELECT {ROOM_COLUMNS} FROM chat_rooms
            WHERE id IN (SELECT room_id FROM chat_room_participants WHERE user_id = $1)
            ORDER BY last_activity DESC, id DESC
            "#
        );
        let rows = sqlx::query_as::<_, ChatRoomRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    async fn find_public(&self, limit: i64, offset: i64) -> Result<Vec<ChatRoom>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            r#"
            SELECT {ROOM_COLUMNS} FROM chat_rooms
            WHERE visibility = 'public'
            ORDER BY last_activity DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        );
        let rows = sqlx::query_as::<_, ChatRoomRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    async fn touch(
        &self,
        room_id: i64,
        last_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE chat_rooms
            SET last_message_id = COALESCE($2, last_message_id),
                last_activity = $3,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(room_id)
        .bind(last_message_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
