//! WebSocket Connection Handler
//!
//! `GET /gateway?token=<jwt>` upgrades to a socket bound to the token's user.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::hub::Hub;
use super::messages::{ClientIntent, ServerEvent};
use super::session::SessionState;
use crate::presentation::middleware::decode_token;
use crate::shared::error::{AppError, ErrorKind};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
) -> Result<Response, AppError> {
    let token = query
        .token
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;
    let user_id = decode_token(&state.settings.jwt.secret, &token)?;

    let hub = state.hub.clone();
    Ok(ws
        .max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, user_id)))
}

/// Runs the unbind when the socket task ends, however it ends.
struct DisconnectGuard {
    hub: Arc<Hub>,
    session: SessionState,
}

impl DisconnectGuard {
    async fn finish(mut self) {
        if let Some(connection_id) = self.session.close() {
            self.hub.disconnect(self.session.user_id, &connection_id).await;
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        // Reached without `finish` only if the task was cancelled or panicked.
        let Some(connection_id) = self.session.close() else {
            return;
        };
        let hub = self.hub.clone();
        let user_id = self.session.user_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { hub.disconnect(user_id, &connection_id).await });
            }
            Err(_) => {
                tracing::error!(connection_id = %connection_id, "No runtime to release connection");
            }
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward queued events to the socket
    let mut sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(event = event.name(), "Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Bound before the hub sees the id: a cancelled connect still unbinds.
    let connection_id = Uuid::new_v4().to_string();
    let mut guard = DisconnectGuard {
        hub: hub.clone(),
        session: SessionState::new(user_id),
    };
    guard.session.bind(connection_id.clone());

    let session = match hub.connect(user_id, &connection_id, tx.clone()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Failed to bind connection");
            let _ = tx.send(ServerEvent::error(e.kind(), e.client_message(), None));
            guard.finish().await;
            drop(tx);
            let _ = sender_task.await;
            return;
        }
    };
    // Only the registry keeps a sender from here on. Once this connection is
    // replaced or unregistered the outbound task ends, and so does the loop.
    drop(session);
    drop(tx);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(session) = hub.gateway().session(&connection_id) else {
                            break;
                        };
                        match serde_json::from_str::<ClientIntent>(text.as_str()) {
                            Ok(intent) => hub.handle(&session, intent).await,
                            Err(e) => {
                                session.send(ServerEvent::error(
                                    ErrorKind::ValidationFailed,
                                    format!("Malformed intent: {}", e),
                                    None,
                                ));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    // Pings are answered by axum
                    _ => {}
                }
            }
            _ = &mut sender_task => {
                tracing::debug!(connection_id = %connection_id, "Outbound channel closed");
                break;
            }
        }
    }

    guard.finish().await;
    sender_task.abort();
}
