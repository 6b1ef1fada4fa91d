//! Room Handlers

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{CreateRoomRequest, PageQuery};
use crate::application::dto::response::{MessageHistoryResponse, RoomResponse};
use crate::application::pagination::PageRequest;
use crate::application::services::CreateRoomDto;
use crate::presentation::http::extractors::IdPath;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_request;
use crate::startup::AppState;

/// Create a room; the creator becomes its admin
pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    validate_request(&body)?;

    let room = state
        .services
        .rooms
        .create(
            auth.user_id,
            CreateRoomDto {
                name: body.name,
                description: body.description,
                visibility: body.visibility,
            },
        )
        .await?;
    state.hub.room_joined(auth.user_id, room.id);

    Ok((StatusCode::CREATED, Json(room.into())))
}

/// Rooms the caller belongs to
pub async fn list_my_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    let rooms = state.services.rooms.list_for_user(auth.user_id).await?;
    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

pub async fn list_public_rooms(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let rooms = state.services.rooms.list_public(page).await?;
    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

pub async fn join_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(room_id): IdPath,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.services.rooms.join(room_id, auth.user_id).await?;
    state.hub.room_joined(auth.user_id, room.id);
    Ok(Json(room.into()))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(room_id): IdPath,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.services.rooms.leave(room_id, auth.user_id).await?;
    state.hub.room_left(auth.user_id, room.id);
    Ok(Json(room.into()))
}

/// Chronological history page; participants only
pub async fn get_room_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(room_id): IdPath,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessageHistoryResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let history = state
        .services
        .rooms
        .messages(room_id, auth.user_id, page)
        .await?;
    Ok(Json(history.into()))
}
