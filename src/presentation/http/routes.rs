//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, track_http_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // The gateway authenticates through `?token=`
        .route("/gateway", get(ws_handler))
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_http_metrics))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::gather_metrics(),
    )
}

/// API v1 routes
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::user::register))
        .merge(user_routes(state.clone()))
        .merge(friend_routes(state.clone()))
        .merge(room_routes(state.clone()))
        .merge(private_chat_routes(state.clone()))
        .merge(message_routes(state))
}

/// User routes (protected)
fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/@me", get(handlers::user::get_current_user))
        .route("/users/online", get(handlers::user::get_online_users))
        .route("/users/{id}", get(handlers::user::get_user))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Friend request and friend list routes (protected)
fn friend_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/friends", get(handlers::friend::list_friends))
        .route("/friends/{id}", delete(handlers::friend::remove_friend))
        .route("/friends/requests", post(handlers::friend::send_request))
        .route("/friends/requests/received", get(handlers::friend::list_received))
        .route("/friends/requests/sent", get(handlers::friend::list_sent))
        .route("/friends/requests/{id}/accept", post(handlers::friend::accept_request))
        .route("/friends/requests/{id}/decline", post(handlers::friend::decline_request))
        .route("/friends/requests/{id}/cancel", post(handlers::friend::cancel_request))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Room routes (protected)
fn room_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/rooms",
            get(handlers::room::list_my_rooms).post(handlers::room::create_room),
        )
        .route("/rooms/public", get(handlers::room::list_public_rooms))
        .route("/rooms/{id}/join", post(handlers::room::join_room))
        .route("/rooms/{id}/leave", post(handlers::room::leave_room))
        .route("/rooms/{id}/messages", get(handlers::room::get_room_messages))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Private chat routes (protected)
fn private_chat_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/private-chats", get(handlers::private_chat::list_chats))
        .route(
            "/private-chats/with/{id}",
            get(handlers::private_chat::get_chat_with),
        )
        .route(
            "/private-chats/{id}",
            get(handlers::private_chat::get_chat).delete(handlers::private_chat::delete_chat),
        )
        .route(
            "/private-chats/{id}/messages",
            get(handlers::private_chat::get_chat_messages)
                .post(handlers::private_chat::send_chat_message),
        )
        .route("/private-chats/{id}/read", post(handlers::private_chat::mark_chat_read))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Message routes (protected)
fn message_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/messages/{id}", patch(handlers::message::edit_message))
        .route("/messages/{id}/read", post(handlers::message::mark_message_read))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
