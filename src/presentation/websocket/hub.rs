//! Presence & Connection Hub
//!
//! Binds connections to users, turns client intents into service calls and
//! fans the results out through the [`Gateway`]. The HTTP handlers push their
//! notifications through here too.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::gateway::{ChannelKey, ConnectedSession, Gateway};
use super::messages::{
    ClientIntent, FriendRequestReceivedPayload, FriendRequestResponsePayload, MessageReadPayload,
    PresencePayload, PrivateMessageNotificationPayload, RoomPresencePayload, ServerEvent,
    TypingPayload, UserTypingPayload,
};
use crate::application::dto::response::{FriendRequestResponse, MessageResponse, UserResponse};
use crate::application::services::{ReadOutcome, Services};
use crate::config::MessagingSettings;
use crate::domain::{FriendRequest, Message, MessageTarget, MessageType, PrivateChat, User};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, ErrorKind};

/// Cap on the online list sent to a freshly bound connection
const ONLINE_USERS_LIMIT: i64 = 100;

pub struct Hub {
    gateway: Arc<Gateway>,
    services: Services,
    preview_length: usize,
}

impl Hub {
    pub fn new(gateway: Arc<Gateway>, services: Services, limits: &MessagingSettings) -> Self {
        Self {
            gateway,
            services,
            preview_length: limits.preview_length,
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Bind `connection_id` as the connection of `user_id`.
    ///
    /// Marks the user online, subscribes the connection to every room the
    /// user belongs to, announces the user and replies with `user_rooms` and
    /// `online_users`. A previous connection of the same user is replaced.
    ///
    /// The caller owns `connection_id` before this runs, so an interrupted
    /// bind can still be undone with [`Hub::disconnect`].
    pub async fn connect(
        &self,
        user_id: i64,
        connection_id: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Arc<ConnectedSession>, AppError> {
        let presence_lock = self.gateway.lock_user(user_id).await;
        let user = self
            .services
            .users
            .bind_connection(user_id, connection_id)
            .await?;

        let (session, replaced) =
            self.gateway
                .register(connection_id, user.id, user.username.clone(), sender);
        if let Some(old) = replaced {
            old.send(ServerEvent::error(
                ErrorKind::Conflict,
                "Session replaced by a newer connection",
                None,
            ));
        }

        for room_id in &user.joined_rooms {
            self.gateway.subscribe(connection_id, ChannelKey::Room(*room_id));
        }

        self.gateway.broadcast_all(
            &ServerEvent::UserOnline(presence(&user, true, user.last_seen)),
            Some(connection_id),
        );
        drop(presence_lock);

        session.send(ServerEvent::UserRooms {
            room_ids: user.joined_rooms.iter().map(|id| id.to_string()).collect(),
        });
        match self.online_users().await {
            Ok(users) => {
                session.send(ServerEvent::OnlineUsers { users });
            }
            Err(e) => error!(user_id, error = %e, "Failed to list online users"),
        }

        metrics::set_gateway_connections(self.gateway.connection_count());
        info!(
            user_id,
            connection_id = %connection_id,
            rooms = user.joined_rooms.len(),
            "User connected"
        );

        Ok(session)
    }

    /// Online users with a live connection on this hub.
    ///
    /// The store may still list users whose process died without a clean
    /// disconnect; those are left out.
    pub async fn online_users(&self) -> Result<Vec<UserResponse>, AppError> {
        let users = self.services.users.list_online(ONLINE_USERS_LIMIT).await?;
        Ok(users
            .into_iter()
            .filter(|u| self.gateway.is_online(u.id))
            .map(|u| UserResponse::from_user(u, false))
            .collect())
    }

    /// Unbind a connection. Safe to call more than once.
    ///
    /// Releases the store binding even when the connection never reached the
    /// registry.
    pub async fn disconnect(&self, user_id: i64, connection_id: &str) {
        let _presence_lock = self.gateway.lock_user(user_id).await;
        let removed = self.gateway.unregister(connection_id);
        if removed.is_some() {
            metrics::set_gateway_connections(self.gateway.connection_count());
        }

        match self
            .services
            .users
            .release_connection(user_id, connection_id)
            .await
        {
            Ok(true) => {
                // Nobody heard `user_online` for a connection that never registered.
                if let Some(removed) = removed {
                    let event = ServerEvent::UserOffline(PresencePayload {
                        user_id: user_id.to_string(),
                        username: removed.session.username.clone(),
                        is_online: false,
                        last_seen: Utc::now().to_rfc3339(),
                    });
                    self.gateway.broadcast_all(&event, None);
                }
                info!(user_id, connection_id = %connection_id, "User disconnected");
            }
            Ok(false) => {
                debug!(
                    user_id,
                    connection_id = %connection_id,
                    "Connection already released or replaced"
                );
            }
            Err(e) => {
                error!(
                    user_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to release connection"
                );
            }
        }
    }

    /// Handle one intent. Failures become an `error` event on the same
    /// connection; the connection stays open.
    pub async fn handle(&self, session: &ConnectedSession, intent: ClientIntent) {
        let name = intent.name();
        let result = match intent {
            ClientIntent::JoinRoom(p) => self.join_room(session, p.room_id).await,
            ClientIntent::LeaveRoom(p) => self.leave_room(session, p.room_id),
            ClientIntent::SendMessage(p) => {
                self.send(
                    session,
                    MessageTarget::Room(p.room_id),
                    &p.content,
                    p.message_type.as_deref(),
                    p.reply_to,
                )
                .await
            }
            ClientIntent::SendPrivateMessage(p) => {
                self.send(
                    session,
                    MessageTarget::PrivateChat(p.chat_id),
                    &p.content,
                    p.message_type.as_deref(),
                    p.reply_to,
                )
                .await
            }
            ClientIntent::MarkMessageRead(p) => self.mark_read(session, p.message_id).await,
            ClientIntent::TypingStart(p) => self.typing(session, &p, true),
            ClientIntent::TypingStop(p) => self.typing(session, &p, false),
            ClientIntent::JoinPrivateChat(p) => self.join_private_chat(session, p.chat_id).await,
            ClientIntent::FriendRequestSent(p) => {
                self.relay_friend_request(session, p.request_id).await
            }
            ClientIntent::FriendRequestResponded(p) => {
                self.relay_friend_response(session, p.request_id).await
            }
        };

        if let Err(err) = result {
            debug!(
                user_id = session.user_id,
                connection_id = %session.connection_id,
                intent = name,
                error = %err,
                "Intent failed"
            );
            session.send(ServerEvent::error(err.kind(), err.client_message(), Some(name)));
        }
    }

    async fn join_room(&self, session: &ConnectedSession, room_id: i64) -> Result<(), AppError> {
        self.services
            .rooms
            .get_participating(room_id, session.user_id)
            .await?;
        self.enter_room(session, room_id);
        session.send(ServerEvent::JoinedRoom {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    fn leave_room(&self, session: &ConnectedSession, room_id: i64) -> Result<(), AppError> {
        self.exit_room(session, room_id);
        session.send(ServerEvent::LeftRoom {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    fn enter_room(&self, session: &ConnectedSession, room_id: i64) {
        let key = ChannelKey::Room(room_id);
        if self.gateway.subscribe(&session.connection_id, key) {
            let event = ServerEvent::UserJoinedRoom(RoomPresencePayload {
                room_id: room_id.to_string(),
                user_id: session.user_id.to_string(),
                username: session.username.clone(),
            });
            self.gateway.broadcast(key, &event, Some(&session.connection_id));
        }
    }

    fn exit_room(&self, session: &ConnectedSession, room_id: i64) {
        let key = ChannelKey::Room(room_id);
        if self.gateway.unsubscribe(&session.connection_id, key) {
            let event = ServerEvent::UserLeftRoom(RoomPresencePayload {
                room_id: room_id.to_string(),
                user_id: session.user_id.to_string(),
                username: session.username.clone(),
            });
            self.gateway.broadcast(key, &event, None);
        }
    }

    /// A room membership was added outside the gateway (HTTP create/join).
    pub fn room_joined(&self, user_id: i64, room_id: i64) {
        if let Some(session) = self.gateway.user_session(user_id) {
            self.enter_room(&session, room_id);
        }
    }

    /// A room membership was removed outside the gateway (HTTP leave).
    pub fn room_left(&self, user_id: i64, room_id: i64) {
        if let Some(session) = self.gateway.user_session(user_id) {
            self.exit_room(&session, room_id);
        }
    }

    async fn send(
        &self,
        session: &ConnectedSession,
        target: MessageTarget,
        content: &str,
        message_type: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<(), AppError> {
        let message_type = message_type
            .map(MessageType::try_from)
            .transpose()?
            .unwrap_or_default();
        let message = self
            .services
            .messages
            .send(session.user_id, target, content, message_type, reply_to)
            .await?;
        self.publish_message(&message, &session.username).await
    }

    /// Fan a freshly created message out to its destination channel.
    ///
    /// Private messages also raise a preview notification on the other
    /// participant's connection. Once any user other than the author has had
    /// the message queued, it is marked delivered.
    pub async fn publish_message(&self, message: &Message, author_name: &str) -> Result<(), AppError> {
        let payload = MessageResponse::from(message.clone());
        let mut recipients = match message.target {
            MessageTarget::Room(room_id) => {
                self.gateway
                    .broadcast(ChannelKey::Room(room_id), &ServerEvent::NewMessage(payload), None)
            }
            MessageTarget::PrivateChat(chat_id) => self.gateway.broadcast(
                ChannelKey::PrivateChat(chat_id),
                &ServerEvent::NewPrivateMessage(payload),
                None,
            ),
        };

        if let MessageTarget::PrivateChat(chat_id) = message.target {
            let chat = self
                .services
                .private_chats
                .get_participating(chat_id, message.sender_id)
                .await?;
            if let Some(other) = chat.other_participant(message.sender_id) {
                let notification =
                    ServerEvent::PrivateMessageNotification(PrivateMessageNotificationPayload {
                        chat_id: chat_id.to_string(),
                        message_id: message.id.to_string(),
                        sender_id: message.sender_id.to_string(),
                        sender_name: author_name.to_string(),
                        message_preview: preview(&message.content, self.preview_length),
                        timestamp: message.created_at.to_rfc3339(),
                    });
                if self.gateway.send_to_user(other, notification) {
                    recipients.push(other);
                }
            }
        }

        if recipients.iter().any(|&user_id| user_id != message.sender_id) {
            self.services.messages.mark_delivered(message.id).await?;
        }
        Ok(())
    }

    /// Fan an edit out to the message's destination channel.
    pub fn publish_edit(&self, message: &Message) {
        let key = match message.target {
            MessageTarget::Room(id) => ChannelKey::Room(id),
            MessageTarget::PrivateChat(id) => ChannelKey::PrivateChat(id),
        };
        self.gateway.broadcast(
            key,
            &ServerEvent::MessageEdited(MessageResponse::from(message.clone())),
            None,
        );
    }

    async fn mark_read(&self, session: &ConnectedSession, message_id: i64) -> Result<(), AppError> {
        let outcome = self
            .services
            .messages
            .mark_read(message_id, session.user_id)
            .await?;
        self.notify_read(&outcome, session.user_id);
        Ok(())
    }

    /// Tell the author their message was read, if this was a first read.
    pub fn notify_read(&self, outcome: &ReadOutcome, reader_id: i64) -> bool {
        if !outcome.newly_read {
            return false;
        }
        let read_at = outcome
            .message
            .read_by
            .iter()
            .find(|r| r.user_id == reader_id)
            .map_or_else(Utc::now, |r| r.read_at);

        self.gateway.send_to_user(
            outcome.message.sender_id,
            ServerEvent::MessageRead(MessageReadPayload {
                message_id: outcome.message.id.to_string(),
                read_by: reader_id.to_string(),
                read_at: read_at.to_rfc3339(),
            }),
        )
    }

    fn typing(&self, session: &ConnectedSession, target: &TypingPayload, started: bool) -> Result<(), AppError> {
        let key = match (target.room_id, target.chat_id) {
            (Some(room_id), None) => ChannelKey::Room(room_id),
            (None, Some(chat_id)) => ChannelKey::PrivateChat(chat_id),
            _ => {
                return Err(AppError::Validation(
                    "Exactly one of roomId or chatId is required".into(),
                ))
            }
        };
        if !session.is_subscribed(key) {
            return Err(AppError::Forbidden(format!("Not joined to {}", key)));
        }

        let payload = UserTypingPayload {
            user_id: session.user_id.to_string(),
            username: session.username.clone(),
            room_id: target.room_id.map(|id| id.to_string()),
            chat_id: target.chat_id.map(|id| id.to_string()),
        };
        let event = if started {
            ServerEvent::UserTyping(payload)
        } else {
            ServerEvent::UserStopTyping(payload)
        };
        self.gateway.broadcast(key, &event, Some(&session.connection_id));
        Ok(())
    }

    async fn join_private_chat(&self, session: &ConnectedSession, chat_id: i64) -> Result<(), AppError> {
        self.services
            .private_chats
            .get_participating(chat_id, session.user_id)
            .await?;
        self.gateway
            .subscribe(&session.connection_id, ChannelKey::PrivateChat(chat_id));
        session.send(ServerEvent::JoinedPrivateChat {
            chat_id: chat_id.to_string(),
        });
        Ok(())
    }

    /// Drop both participants' subscriptions to a deactivated chat.
    pub fn close_private_chat(&self, chat: &PrivateChat) {
        let key = ChannelKey::PrivateChat(chat.id);
        for user_id in chat.participants.members() {
            self.gateway.unsubscribe_user(user_id, key);
        }
    }

    async fn relay_friend_request(&self, session: &ConnectedSession, request_id: i64) -> Result<(), AppError> {
        let request = self.services.friends.get_request(request_id).await?;
        if request.sender_id != session.user_id {
            return Err(AppError::Forbidden("Not the sender of this friend request".into()));
        }
        self.notify_friend_request(&request).await?;
        Ok(())
    }

    async fn relay_friend_response(&self, session: &ConnectedSession, request_id: i64) -> Result<(), AppError> {
        let request = self.services.friends.get_request(request_id).await?;
        if request.receiver_id != session.user_id {
            return Err(AppError::Forbidden("Not the receiver of this friend request".into()));
        }
        if request.is_pending() {
            return Err(AppError::InvalidState("Friend request has not been answered".into()));
        }
        self.notify_friend_response(&request, session.user_id).await?;
        Ok(())
    }

    /// Push `friend_request_received` to the receiver, if connected.
    pub async fn notify_friend_request(&self, request: &FriendRequest) -> Result<bool, AppError> {
        let sender = self.services.users.get_user(request.sender_id).await?;
        let friend_request = FriendRequestResponse {
            user: Some(UserResponse::from_user(sender, false)),
            ..FriendRequestResponse::from(request.clone())
        };
        Ok(self.gateway.send_to_user(
            request.receiver_id,
            ServerEvent::FriendRequestReceived(FriendRequestReceivedPayload {
                friend_request,
                timestamp: request.created_at.to_rfc3339(),
            }),
        ))
    }

    /// Push `friend_request_response` to the side that did not act, if
    /// connected. `actor_id` answered (or, for a cancel, withdrew) the request.
    pub async fn notify_friend_response(&self, request: &FriendRequest, actor_id: i64) -> Result<bool, AppError> {
        let actor = self.services.users.get_user(actor_id).await?;
        let counterpart = if actor_id == request.sender_id {
            request.receiver_id
        } else {
            request.sender_id
        };
        Ok(self.gateway.send_to_user(
            counterpart,
            ServerEvent::FriendRequestResponse(FriendRequestResponsePayload {
                request_id: request.id.to_string(),
                status: request.status.as_str().to_string(),
                responder_id: actor.id.to_string(),
                responder_name: actor.username,
                timestamp: request.responded_at.unwrap_or_else(Utc::now).to_rfc3339(),
            }),
        ))
    }
}

fn presence(user: &User, is_online: bool, last_seen: DateTime<Utc>) -> PresencePayload {
    PresencePayload {
        user_id: user.id.to_string(),
        username: user.username.clone(),
        is_online,
        last_seen: last_seen.to_rfc3339(),
    }
}

/// First `max_chars` characters, with `...` appended when cut.
fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::PageRequest;
    use crate::application::services::{CreateRoomDto, Decision, UserError, UserService};
    use crate::domain::{DeliveryStatus, RoomVisibility};
    use crate::infrastructure::Repositories;
    use crate::presentation::websocket::messages::{
        MarkReadPayload, PrivateChatPayload, RoomPayload, SendMessagePayload,
        SendPrivateMessagePayload,
    };
    use crate::shared::snowflake::SnowflakeGenerator;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    type Rx = mpsc::UnboundedReceiver<ServerEvent>;

    fn hub() -> Hub {
        let repos = Repositories::in_memory();
        let limits = MessagingSettings {
            preview_length: 5,
            ..MessagingSettings::default()
        };
        let services = Services::new(&repos, Arc::new(SnowflakeGenerator::new(1)), limits.clone());
        Hub::new(Arc::new(Gateway::new()), services, &limits)
    }

    async fn register(hub: &Hub, name: &str) -> i64 {
        hub.services
            .users
            .register(name, &format!("{}@example.com", name))
            .await
            .unwrap()
            .id
    }

    async fn connect(hub: &Hub, user_id: i64) -> (Arc<ConnectedSession>, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4().to_string();
        let session = hub.connect(user_id, &connection_id, tx).await.unwrap();
        (session, rx)
    }

    async fn public_room(hub: &Hub, owner: i64, name: &str) -> i64 {
        hub.services
            .rooms
            .create(
                owner,
                CreateRoomDto {
                    name: name.into(),
                    description: None,
                    visibility: RoomVisibility::Public,
                },
            )
            .await
            .unwrap()
            .id
    }

    /// Yields around every store write, the way a database round trip does.
    struct YieldingUsers {
        inner: Arc<dyn UserService>,
        /// Connection id whose bind never returns
        stall_on: Option<String>,
    }

    #[async_trait]
    impl UserService for YieldingUsers {
        async fn register(&self, username: &str, email: &str) -> Result<User, UserError> {
            self.inner.register(username, email).await
        }

        async fn get_user(&self, user_id: i64) -> Result<User, UserError> {
            self.inner.get_user(user_id).await
        }

        async fn list_online(&self, limit: i64) -> Result<Vec<User>, UserError> {
            self.inner.list_online(limit).await
        }

        async fn bind_connection(&self, user_id: i64, connection_id: &str) -> Result<User, UserError> {
            tokio::task::yield_now().await;
            let user = self.inner.bind_connection(user_id, connection_id).await?;
            if self.stall_on.as_deref() == Some(connection_id) {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            Ok(user)
        }

        async fn release_connection(&self, user_id: i64, connection_id: &str) -> Result<bool, UserError> {
            tokio::task::yield_now().await;
            let released = self.inner.release_connection(user_id, connection_id).await?;
            tokio::task::yield_now().await;
            Ok(released)
        }
    }

    fn yielding_hub(stall_on: Option<&str>) -> Hub {
        let base = hub();
        let services = Services {
            users: Arc::new(YieldingUsers {
                inner: base.services.users.clone(),
                stall_on: stall_on.map(str::to_string),
            }),
            ..base.services.clone()
        };
        Hub::new(Arc::new(Gateway::new()), services, &MessagingSettings::default())
    }

    fn drain(rx: &mut Rx) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[ServerEvent]) -> Vec<&'static str> {
        events.iter().map(ServerEvent::name).collect()
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("hello", 5), "hello");
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("héllo wörld", 7), "héllo w...");
    }

    #[tokio::test]
    async fn test_bind_without_rooms() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;

        // A stale online flag with no live connection.
        hub.services.users.bind_connection(bob, "ghost").await.unwrap();

        let (_session, mut rx) = connect(&hub, alice).await;
        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["user_rooms", "online_users"]);

        match &events[0] {
            ServerEvent::UserRooms { room_ids } => assert!(room_ids.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        match &events[1] {
            ServerEvent::OnlineUsers { users } => {
                let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
                assert_eq!(ids, vec![alice.to_string().as_str()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_announce_presence() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;

        let (_a, mut rx_a) = connect(&hub, alice).await;
        drain(&mut rx_a);
        let (b, mut rx_b) = connect(&hub, bob).await;
        drain(&mut rx_b);
        assert_eq!(names(&drain(&mut rx_a)), vec!["user_online"]);

        hub.disconnect(bob, &b.connection_id).await;
        hub.disconnect(bob, &b.connection_id).await;
        assert_eq!(names(&drain(&mut rx_a)), vec!["user_offline"]);

        let bob_now = hub.services.users.get_user(bob).await.unwrap();
        assert!(!bob_now.is_online);
        assert!(bob_now.connection_id.is_none());
    }

    #[tokio::test]
    async fn test_replaced_connection_keeps_user_online() {
        let hub = hub();
        let alice = register(&hub, "alice").await;

        let (first, mut rx1) = connect(&hub, alice).await;
        let (second, _rx2) = connect(&hub, alice).await;
        assert!(names(&drain(&mut rx1)).contains(&"error"));

        hub.disconnect(alice, &first.connection_id).await;
        let user = hub.services.users.get_user(alice).await.unwrap();
        assert_eq!(user.connection_id.as_deref(), Some(second.connection_id.as_str()));
        assert!(user.is_online);
    }

    #[tokio::test]
    async fn test_room_message_fan_out_marks_delivered() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let room = hub
            .services
            .rooms
            .create(
                alice,
                CreateRoomDto {
                    name: "general".into(),
                    description: None,
                    visibility: RoomVisibility::Public,
                },
            )
            .await
            .unwrap();
        hub.services.rooms.join(room.id, bob).await.unwrap();

        let (a, mut rx_a) = connect(&hub, alice).await;
        let (_b, mut rx_b) = connect(&hub, bob).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(
            &a,
            ClientIntent::SendMessage(SendMessagePayload {
                room_id: room.id,
                content: " hi all ".into(),
                message_type: None,
                reply_to: None,
            }),
        )
        .await;

        let received = drain(&mut rx_b);
        let ServerEvent::NewMessage(message) = &received[0] else {
            panic!("expected new_message, got {received:?}");
        };
        assert_eq!(message.content, "hi all");
        assert_eq!(names(&drain(&mut rx_a)), vec!["new_message"]);

        let stored = hub
            .services
            .messages
            .get(message.id.parse().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_failed_intent_emits_scoped_error() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let (a, mut rx) = connect(&hub, alice).await;
        drain(&mut rx);

        hub.handle(&a, ClientIntent::JoinRoom(RoomPayload { room_id: 404 })).await;
        hub.handle(
            &a,
            ClientIntent::TypingStart(TypingPayload {
                room_id: None,
                chat_id: None,
            }),
        )
        .await;

        let events = drain(&mut rx);
        let kinds: Vec<(ErrorKind, Option<String>)> = events
            .iter()
            .map(|e| match e {
                ServerEvent::Error(p) => (p.kind, p.intent.clone()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ErrorKind::NotFound, Some("joinRoom".to_string())),
                (ErrorKind::ValidationFailed, Some("typingStart".to_string())),
            ]
        );
        // Still bound after errors.
        assert!(hub.gateway().is_online(alice));
    }

    #[tokio::test]
    async fn test_private_message_notification_and_read_receipt() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let request = hub
            .services
            .friends
            .send_request(alice, bob, Some("hi".into()))
            .await
            .unwrap();
        let chat = hub
            .services
            .friends
            .respond(request.id, bob, Decision::Accept)
            .await
            .unwrap()
            .chat
            .unwrap();

        let (a, mut rx_a) = connect(&hub, alice).await;
        let (b, mut rx_b) = connect(&hub, bob).await;
        hub.handle(&a, ClientIntent::JoinPrivateChat(PrivateChatPayload { chat_id: chat.id }))
            .await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(
            &a,
            ClientIntent::SendPrivateMessage(SendPrivateMessagePayload {
                chat_id: chat.id,
                content: "hello there".into(),
                message_type: None,
                reply_to: None,
            }),
        )
        .await;

        // Bob never joined the chat channel; he still gets the preview.
        let events = drain(&mut rx_b);
        let ServerEvent::PrivateMessageNotification(note) = &events[0] else {
            panic!("expected notification, got {events:?}");
        };
        assert_eq!(note.message_preview, "hello...");
        assert_eq!(note.sender_name, "alice");
        let message_id: i64 = note.message_id.parse().unwrap();
        assert_eq!(names(&drain(&mut rx_a)), vec!["new_private_message"]);

        hub.handle(&b, ClientIntent::MarkMessageRead(MarkReadPayload { message_id }))
            .await;
        let events = drain(&mut rx_a);
        let ServerEvent::MessageRead(read) = &events[0] else {
            panic!("expected message_read, got {events:?}");
        };
        assert_eq!(read.read_by, bob.to_string());

        let stored = hub.services.messages.get(message_id).await.unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Read);
        assert_eq!(hub.services.private_chats.unread_count(chat.id, bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_friend_notifications_reach_counterpart() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let (_a, mut rx_a) = connect(&hub, alice).await;
        let (_b, mut rx_b) = connect(&hub, bob).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let request = hub.services.friends.send_request(alice, bob, None).await.unwrap();
        assert!(hub.notify_friend_request(&request).await.unwrap());
        let events = drain(&mut rx_b);
        let ServerEvent::FriendRequestReceived(payload) = &events[0] else {
            panic!("expected friend_request_received, got {events:?}");
        };
        assert_eq!(
            payload.friend_request.user.as_ref().map(|u| u.username.as_str()),
            Some("alice")
        );

        let declined = hub
            .services
            .friends
            .respond(request.id, bob, Decision::Decline)
            .await
            .unwrap();
        assert!(hub.notify_friend_response(&declined.request, bob).await.unwrap());
        let events = drain(&mut rx_a);
        let ServerEvent::FriendRequestResponse(payload) = &events[0] else {
            panic!("expected friend_request_response, got {events:?}");
        };
        assert_eq!(payload.status, "declined");
        assert_eq!(payload.responder_name, "bob");
    }

    #[tokio::test]
    async fn test_connect_waits_for_presence_lock() {
        let hub = Arc::new(hub());
        let alice = register(&hub, "alice").await;
        let held = hub.gateway().lock_user(alice).await;

        let pending = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let (tx, rx) = mpsc::unbounded_channel();
                let bound = hub
                    .connect(alice, "late", tx)
                    .await
                    .map(|s| s.connection_id.clone());
                (bound, rx)
            })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!pending.is_finished());
        assert!(!hub.services.users.get_user(alice).await.unwrap().is_online);

        drop(held);
        let (bound, _rx) = pending.await.unwrap();
        assert_eq!(bound.unwrap(), "late");
        assert!(hub.gateway().is_online(alice));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_connects_keep_store_and_registry_in_step() {
        let hub = Arc::new(yielding_hub(None));
        let alice = register(&hub, "alice").await;

        for round in 0..25 {
            let tasks: Vec<_> = (0..4)
                .map(|i| {
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        let connection_id = format!("conn-{round}-{i}");
                        let (tx, _rx) = mpsc::unbounded_channel();
                        hub.connect(alice, &connection_id, tx).await.unwrap();
                        if i % 2 == 0 {
                            hub.disconnect(alice, &connection_id).await;
                        }
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let stored = hub.services.users.get_user(alice).await.unwrap();
            let active = hub
                .gateway()
                .user_session(alice)
                .map(|s| s.connection_id.clone());
            assert_eq!(stored.connection_id, active, "round {round}");
            assert_eq!(stored.is_online, hub.gateway().is_online(alice), "round {round}");
        }

        // Whatever won, a disconnect of the survivor leaves the user offline.
        if let Some(session) = hub.gateway().user_session(alice) {
            hub.disconnect(alice, &session.connection_id).await;
        }
        let user = hub.services.users.get_user(alice).await.unwrap();
        assert!(!user.is_online);
        assert!(!hub.gateway().is_online(alice));
    }

    #[tokio::test]
    async fn test_interrupted_connect_is_released() {
        let hub = yielding_hub(Some("cut"));
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let (_b, mut rx_b) = connect(&hub, bob).await;
        drain(&mut rx_b);

        let (tx, _rx) = mpsc::unbounded_channel();
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), hub.connect(alice, "cut", tx)).await;
        assert!(attempt.is_err());
        assert!(hub.services.users.get_user(alice).await.unwrap().is_online);
        assert!(!hub.gateway().is_online(alice));

        hub.disconnect(alice, "cut").await;
        let user = hub.services.users.get_user(alice).await.unwrap();
        assert!(!user.is_online);
        assert!(user.connection_id.is_none());
        // Never announced online, so no offline event either.
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_type_is_rejected() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let room_id = public_room(&hub, alice, "general").await;
        hub.services.rooms.join(room_id, bob).await.unwrap();

        let (a, mut rx_a) = connect(&hub, alice).await;
        let (_b, mut rx_b) = connect(&hub, bob).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(
            &a,
            ClientIntent::SendMessage(SendMessagePayload {
                room_id,
                content: "clip".into(),
                message_type: Some("video".into()),
                reply_to: None,
            }),
        )
        .await;

        let events = drain(&mut rx_a);
        let [ServerEvent::Error(err)] = events.as_slice() else {
            panic!("expected a single error, got {events:?}");
        };
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
        assert_eq!(err.intent.as_deref(), Some("sendMessage"));
        assert!(drain(&mut rx_b).is_empty());

        let page = PageRequest::new(None, None, &MessagingSettings::default());
        let history = hub.services.rooms.messages(room_id, alice, page).await.unwrap();
        assert!(history.messages.is_empty());
    }

    #[tokio::test]
    async fn test_typing_reaches_other_subscribers_only() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let carol = register(&hub, "carol").await;
        let room_id = public_room(&hub, alice, "general").await;
        hub.services.rooms.join(room_id, bob).await.unwrap();

        let (a, mut rx_a) = connect(&hub, alice).await;
        let (_b, mut rx_b) = connect(&hub, bob).await;
        let (_c, mut rx_c) = connect(&hub, carol).await;
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        let target = TypingPayload {
            room_id: Some(room_id),
            chat_id: None,
        };
        hub.handle(&a, ClientIntent::TypingStart(target.clone())).await;
        hub.handle(&a, ClientIntent::TypingStop(target)).await;

        let events = drain(&mut rx_b);
        assert_eq!(names(&events), vec!["user_typing", "user_stop_typing"]);
        let ServerEvent::UserTyping(typing) = &events[0] else {
            panic!("expected user_typing, got {events:?}");
        };
        assert_eq!(typing.user_id, alice.to_string());
        assert_eq!(typing.username, "alice");
        assert_eq!(typing.room_id, Some(room_id.to_string()));
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn test_join_and_leave_room_notify_other_subscribers() {
        let hub = hub();
        let alice = register(&hub, "alice").await;
        let bob = register(&hub, "bob").await;
        let carol = register(&hub, "carol").await;
        let room_id = public_room(&hub, alice, "general").await;

        let (_a, mut rx_a) = connect(&hub, alice).await;
        let (b, mut rx_b) = connect(&hub, bob).await;
        let (_c, mut rx_c) = connect(&hub, carol).await;
        // Membership without a subscription until bob asks for it.
        hub.services.rooms.join(room_id, bob).await.unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        hub.handle(&b, ClientIntent::JoinRoom(RoomPayload { room_id })).await;
        assert_eq!(names(&drain(&mut rx_b)), vec!["joined_room"]);
        let events = drain(&mut rx_a);
        let [ServerEvent::UserJoinedRoom(joined)] = events.as_slice() else {
            panic!("expected user_joined_room, got {events:?}");
        };
        assert_eq!(joined.room_id, room_id.to_string());
        assert_eq!(joined.user_id, bob.to_string());
        assert_eq!(joined.username, "bob");

        hub.handle(&b, ClientIntent::LeaveRoom(RoomPayload { room_id })).await;
        assert_eq!(names(&drain(&mut rx_b)), vec!["left_room"]);
        let events = drain(&mut rx_a);
        let [ServerEvent::UserLeftRoom(left)] = events.as_slice() else {
            panic!("expected user_left_room, got {events:?}");
        };
        assert_eq!(left.user_id, bob.to_string());
        assert!(!b.is_subscribed(ChannelKey::Room(room_id)));

        assert!(drain(&mut rx_c).is_empty());
    }
}
