//! User Handlers

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{OnlineQuery, RegisterRequest};
use crate::application::dto::response::{RegisterResponse, UserResponse};
use crate::presentation::http::extractors::IdPath;
use crate::presentation::middleware::{issue_token, AuthUser};
use crate::shared::error::AppError;
use crate::shared::validation::validate_request;
use crate::startup::AppState;

const MAX_ONLINE_LIMIT: i64 = 100;

/// Register a new user and hand back an access token
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    validate_request(&body)?;

    let user = state.services.users.register(&body.username, &body.email).await?;
    let issued = issue_token(&state.settings.jwt, user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from_user(user, true),
            access_token: issued.token,
            expires_in: issued.expires_in,
            token_type: "Bearer".into(),
        }),
    ))
}

/// Get current authenticated user
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.services.users.get_user(auth.user_id).await?;
    Ok(Json(UserResponse::from_user(user, true)))
}

/// Users currently connected
pub async fn get_online_users(
    State(state): State<AppState>,
    Query(query): Query<OnlineQuery>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let limit = query.limit.unwrap_or(MAX_ONLINE_LIMIT).clamp(1, MAX_ONLINE_LIMIT);
    let users = state.services.users.list_online(limit).await?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| UserResponse::from_user(u, false))
            .collect(),
    ))
}

/// Get user by ID. The email is only shown to its owner.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    IdPath(user_id): IdPath,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.services.users.get_user(user_id).await?;
    let is_self = user.id == auth.user_id;
    Ok(Json(UserResponse::from_user(user, is_self)))
}
