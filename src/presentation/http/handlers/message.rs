//! Message Handlers

use axum::{
    extract::{Extension, State},
    Json,
};

use crate::application::dto::request::EditMessageRequest;
use crate::application::dto::response::{MessageResponse, ReadResponse};
use crate::presentation::http::extractors::IdPath;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_request;
use crate::startup::AppState;

/// Edit a message; author only
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(message_id): IdPath,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_request(&body)?;

    let message = state
        .services
        .messages
        .edit(message_id, auth.user_id, &body.content)
        .await?;
    state.hub.publish_edit(&message);

    Ok(Json(message.into()))
}

/// Acknowledge a message as read
pub async fn mark_message_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(message_id): IdPath,
) -> Result<Json<ReadResponse>, AppError> {
    let outcome = state
        .services
        .messages
        .mark_read(message_id, auth.user_id)
        .await?;
    state.hub.notify_read(&outcome, auth.user_id);

    Ok(Json(ReadResponse {
        newly_read: outcome.newly_read,
        message: outcome.message.into(),
    }))
}
