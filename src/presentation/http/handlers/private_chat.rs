//! Private Chat Handlers

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{MarkChatReadRequest, PageQuery, SendMessageRequest};
use crate::application::dto::response::{
    MessageHistoryResponse, MessageResponse, PrivateChatListResponse, PrivateChatResponse,
    PrivateChatSummaryResponse,
};
use crate::application::pagination::PageRequest;
use crate::domain::{MessageTarget, MessageType};
use crate::presentation::http::extractors::{parse_optional_id, IdPath};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_request;
use crate::startup::AppState;

/// Active chats, most recent first, with unread counts
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PrivateChatListResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let chats = state
        .services
        .private_chats
        .list_for_user(auth.user_id, page)
        .await?;
    Ok(Json(chats.into()))
}

/// The chat with a friend, created on first use
pub async fn get_chat_with(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(friend_id): IdPath,
) -> Result<Json<PrivateChatSummaryResponse>, AppError> {
    let chat = state
        .services
        .friends
        .get_or_create_chat_with(auth.user_id, friend_id)
        .await?;
    let summary = state
        .services
        .private_chats
        .details(chat.id, auth.user_id)
        .await?;
    Ok(Json(summary.into()))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(chat_id): IdPath,
) -> Result<Json<PrivateChatSummaryResponse>, AppError> {
    let summary = state
        .services
        .private_chats
        .details(chat_id, auth.user_id)
        .await?;
    Ok(Json(summary.into()))
}

/// Chronological history page. Moves the caller's read cursor.
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(chat_id): IdPath,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessageHistoryResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let history = state
        .services
        .private_chats
        .messages(chat_id, auth.user_id, page)
        .await?;
    Ok(Json(history.into()))
}

/// Send into a private chat and fan it out like a gateway send
pub async fn send_chat_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(chat_id): IdPath,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    validate_request(&body)?;
    let reply_to = parse_optional_id(body.reply_to.as_deref(), "reply_to")?;
    let message_type = body
        .message_type
        .as_deref()
        .map(MessageType::try_from)
        .transpose()?
        .unwrap_or_default();

    let message = state
        .services
        .messages
        .send(
            auth.user_id,
            MessageTarget::PrivateChat(chat_id),
            &body.content,
            message_type,
            reply_to,
        )
        .await?;

    let author = state.services.users.get_user(auth.user_id).await?;
    if let Err(e) = state.hub.publish_message(&message, &author.username).await {
        tracing::warn!(message_id = message.id, chat_id, error = %e, "Fan-out failed");
    }

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// Mark read up to a message, or to the newest one
pub async fn mark_chat_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(chat_id): IdPath,
    Json(body): Json<MarkChatReadRequest>,
) -> Result<Json<PrivateChatSummaryResponse>, AppError> {
    let message_id = parse_optional_id(body.message_id.as_deref(), "message_id")?;
    state
        .services
        .private_chats
        .mark_read(chat_id, auth.user_id, message_id)
        .await?;
    let summary = state
        .services
        .private_chats
        .details(chat_id, auth.user_id)
        .await?;
    Ok(Json(summary.into()))
}

/// Deactivate a chat. History is kept.
pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(chat_id): IdPath,
) -> Result<Json<PrivateChatResponse>, AppError> {
    let chat = state
        .services
        .private_chats
        .deactivate(chat_id, auth.user_id)
        .await?;
    state.hub.close_private_chat(&chat);
    Ok(Json(chat.into()))
}
