//! Friend Handlers
//!
//! Every mutation also pushes the counterpart's gateway notification.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{FriendRequestQuery, FriendsQuery, SendFriendRequestRequest};
use crate::application::dto::response::{
    FriendDecisionResponse, FriendListResponse, FriendRequestListResponse, FriendRequestResponse,
};
use crate::application::pagination::PageRequest;
use crate::application::services::Decision;
use crate::domain::FriendRequest;
use crate::presentation::http::extractors::{parse_id, IdPath};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_request;
use crate::startup::AppState;

/// Send a friend request
pub async fn send_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SendFriendRequestRequest>,
) -> Result<(StatusCode, Json<FriendRequestResponse>), AppError> {
    validate_request(&body)?;
    let receiver_id = parse_id(&body.receiver_id, "receiver_id")?;

    let request = state
        .services
        .friends
        .send_request(auth.user_id, receiver_id, body.message)
        .await?;
    log_push(state.hub.notify_friend_request(&request).await, &request);

    Ok((StatusCode::CREATED, Json(request.into())))
}

/// Requests addressed to the caller
pub async fn list_received(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<FriendRequestQuery>,
) -> Result<Json<FriendRequestListResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let requests = state
        .services
        .friends
        .list_received(auth.user_id, query.status.unwrap_or_default(), page)
        .await?;
    Ok(Json(requests.into()))
}

/// Requests the caller sent
pub async fn list_sent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<FriendRequestQuery>,
) -> Result<Json<FriendRequestListResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let requests = state
        .services
        .friends
        .list_sent(auth.user_id, query.status.unwrap_or_default(), page)
        .await?;
    Ok(Json(requests.into()))
}

pub async fn accept_request(
    state: State<AppState>,
    auth: Extension<AuthUser>,
    id: IdPath,
) -> Result<Json<FriendDecisionResponse>, AppError> {
    respond(state, auth, id, Decision::Accept).await
}

pub async fn decline_request(
    state: State<AppState>,
    auth: Extension<AuthUser>,
    id: IdPath,
) -> Result<Json<FriendDecisionResponse>, AppError> {
    respond(state, auth, id, Decision::Decline).await
}

async fn respond(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(request_id): IdPath,
    decision: Decision,
) -> Result<Json<FriendDecisionResponse>, AppError> {
    let response = state
        .services
        .friends
        .respond(request_id, auth.user_id, decision)
        .await?;
    log_push(
        state
            .hub
            .notify_friend_response(&response.request, auth.user_id)
            .await,
        &response.request,
    );

    Ok(Json(response.into()))
}

/// Withdraw a pending request
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(request_id): IdPath,
) -> Result<Json<FriendRequestResponse>, AppError> {
    let request = state.services.friends.cancel(request_id, auth.user_id).await?;
    log_push(
        state.hub.notify_friend_response(&request, auth.user_id).await,
        &request,
    );

    Ok(Json(request.into()))
}

/// The caller's friends, online first
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<FriendsQuery>,
) -> Result<Json<FriendListResponse>, AppError> {
    let page = PageRequest::new(query.page, query.limit, &state.settings.messaging);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let friends = state
        .services
        .friends
        .list_friends(auth.user_id, page, search)
        .await?;
    Ok(Json(friends.into()))
}

/// Unfriend. The pair's private chat is deactivated.
pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(friend_id): IdPath,
) -> Result<StatusCode, AppError> {
    let chat = state
        .services
        .friends
        .remove_friend(auth.user_id, friend_id)
        .await?;
    if let Some(chat) = chat {
        state.hub.close_private_chat(&chat);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// The mutation already happened; a failed push is only logged.
fn log_push(result: Result<bool, AppError>, request: &FriendRequest) {
    match result {
        Ok(delivered) => tracing::debug!(
            request_id = request.id,
            status = %request.status,
            delivered,
            "Friend notification pushed"
        ),
        Err(e) => tracing::warn!(
            request_id = request.id,
            error = %e,
            "Friend notification failed"
        ),
    }
}
