//! WebSocket Gateway
//!
//! Registry of live connections and the channels they listen on.
//!
//! Every map is a `DashMap`, so mutations are serialized per key (per
//! connection, per user, per channel). No operation holds a guard on one map
//! while touching another.
//!
//! Presence changes span the store and this registry, so callers take the
//! user's presence lock ([`Gateway::lock_user`]) around both.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};

use super::messages::ServerEvent;

/// A fan-out scope: a room, or one private chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Room(i64),
    PrivateChat(i64),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Room(id) => write!(f, "room_{}", id),
            ChannelKey::PrivateChat(id) => write!(f, "private_{}", id),
        }
    }
}

/// Connected session with message sender
pub struct ConnectedSession {
    pub connection_id: String,
    pub user_id: i64,
    pub username: String,
    channels: Mutex<HashSet<ChannelKey>>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectedSession {
    /// Queue an event. `false` once the socket task has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn is_subscribed(&self, key: ChannelKey) -> bool {
        self.channels.lock().contains(&key)
    }
}

/// Result of removing a connection from the registry
pub struct Unregistered {
    pub session: Arc<ConnectedSession>,
    /// Whether it was still the user's active connection
    pub was_active: bool,
}

/// Connection registry: one active connection per user
#[derive(Default)]
pub struct Gateway {
    /// Sessions by connection id
    sessions: DashMap<String, Arc<ConnectedSession>>,
    /// User id to its active connection id
    user_sessions: DashMap<i64, String>,
    /// Channel to subscribed connection ids
    channels: DashMap<ChannelKey, Vec<String>>,
    /// Per-user presence locks
    user_locks: DashMap<i64, Arc<AsyncMutex<()>>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's presence lock.
    ///
    /// Held across the store update and the registry update of a connect or
    /// disconnect, so the two never interleave for one user.
    pub async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.user_locks.entry(user_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Register a connection as the user's active one.
    ///
    /// Returns the new session and the session it replaced, already detached
    /// from every channel.
    pub fn register(
        &self,
        connection_id: impl Into<String>,
        user_id: i64,
        username: impl Into<String>,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> (Arc<ConnectedSession>, Option<Arc<ConnectedSession>>) {
        let connection_id = connection_id.into();
        let session = Arc::new(ConnectedSession {
            connection_id: connection_id.clone(),
            user_id,
            username: username.into(),
            channels: Mutex::new(HashSet::new()),
            sender,
        });

        self.sessions.insert(connection_id.clone(), session.clone());
        let previous = self.user_sessions.insert(user_id, connection_id.clone());

        let replaced = previous
            .filter(|prev| *prev != connection_id)
            .and_then(|prev| self.detach(&prev));

        tracing::info!(
            user_id,
            connection_id = %connection_id,
            replaced = replaced.is_some(),
            "Session registered"
        );

        (session, replaced)
    }

    /// Remove a connection. `None` if it was already gone.
    pub fn unregister(&self, connection_id: &str) -> Option<Unregistered> {
        let session = self.detach(connection_id)?;
        let was_active = self
            .user_sessions
            .remove_if(&session.user_id, |_, active| active == connection_id)
            .is_some();

        tracing::info!(
            user_id = session.user_id,
            connection_id = %connection_id,
            was_active,
            "Session unregistered"
        );

        Some(Unregistered {
            session,
            was_active,
        })
    }

    fn detach(&self, connection_id: &str) -> Option<Arc<ConnectedSession>> {
        let (_, session) = self.sessions.remove(connection_id)?;
        let keys: Vec<ChannelKey> = session.channels.lock().drain().collect();
        for key in keys {
            self.remove_from_channel(key, connection_id);
        }
        Some(session)
    }

    fn remove_from_channel(&self, key: ChannelKey, connection_id: &str) {
        if let Some(mut members) = self.channels.get_mut(&key) {
            members.retain(|c| c != connection_id);
        }
        self.channels.remove_if(&key, |_, members| members.is_empty());
    }

    pub fn session(&self, connection_id: &str) -> Option<Arc<ConnectedSession>> {
        self.sessions.get(connection_id).map(|s| s.value().clone())
    }

    /// The user's active session, if bound
    pub fn user_session(&self, user_id: i64) -> Option<Arc<ConnectedSession>> {
        let connection_id = self.user_sessions.get(&user_id)?.value().clone();
        self.session(&connection_id)
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.user_sessions.contains_key(&user_id)
    }

    pub fn online_user_ids(&self) -> HashSet<i64> {
        self.user_sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Add a connection to a channel. Returns `false` if it was already there
    /// or the connection is unknown.
    pub fn subscribe(&self, connection_id: &str, key: ChannelKey) -> bool {
        let Some(session) = self.session(connection_id) else {
            return false;
        };
        if !session.channels.lock().insert(key) {
            return false;
        }
        self.channels
            .entry(key)
            .or_default()
            .push(connection_id.to_string());
        true
    }

    pub fn unsubscribe(&self, connection_id: &str, key: ChannelKey) -> bool {
        let Some(session) = self.session(connection_id) else {
            return false;
        };
        if !session.channels.lock().remove(&key) {
            return false;
        }
        self.remove_from_channel(key, connection_id);
        true
    }

    /// Subscribe the user's active connection, if any.
    pub fn subscribe_user(&self, user_id: i64, key: ChannelKey) -> bool {
        match self.user_session(user_id) {
            Some(session) => self.subscribe(&session.connection_id, key),
            None => false,
        }
    }

    pub fn unsubscribe_user(&self, user_id: i64, key: ChannelKey) -> bool {
        match self.user_session(user_id) {
            Some(session) => self.unsubscribe(&session.connection_id, key),
            None => false,
        }
    }

    pub fn send_to_connection(&self, connection_id: &str, event: ServerEvent) -> bool {
        self.session(connection_id)
            .map(|s| s.send(event))
            .unwrap_or(false)
    }

    /// Send to the user's active connection. `false` if the user is offline.
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) -> bool {
        self.user_session(user_id)
            .map(|s| s.send(event))
            .unwrap_or(false)
    }

    /// Fan an event out to a channel, skipping `except`.
    ///
    /// Returns the user ids it was queued for.
    pub fn broadcast(&self, key: ChannelKey, event: &ServerEvent, except: Option<&str>) -> Vec<i64> {
        let members: Vec<String> = match self.channels.get(&key) {
            Some(members) => members.value().clone(),
            None => return Vec::new(),
        };

        members
            .iter()
            .filter(|c| Some(c.as_str()) != except)
            .filter_map(|c| self.session(c))
            .filter(|s| s.send(event.clone()))
            .map(|s| s.user_id)
            .collect()
    }

    /// Send to every connection except `except`. Returns the delivery count.
    pub fn broadcast_all(&self, event: &ServerEvent, except: Option<&str>) -> usize {
        let sessions: Vec<Arc<ConnectedSession>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();

        sessions
            .iter()
            .filter(|s| Some(s.connection_id.as_str()) != except)
            .filter(|s| s.send(event.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        gateway: &Gateway,
        conn: &str,
        user_id: i64,
    ) -> (Arc<ConnectedSession>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (session, _) = gateway.register(conn, user_id, format!("user{}", user_id), tx);
        (session, rx)
    }

    fn ping() -> ServerEvent {
        ServerEvent::JoinedRoom { room_id: "1".into() }
    }

    #[test]
    fn test_channel_key_names() {
        assert_eq!(ChannelKey::Room(3).to_string(), "room_3");
        assert_eq!(ChannelKey::PrivateChat(9).to_string(), "private_9");
    }

    #[test]
    fn test_broadcast_reaches_subscribers_only() {
        let gateway = Gateway::new();
        let (_a, mut rx_a) = connect(&gateway, "a", 1);
        let (_b, mut rx_b) = connect(&gateway, "b", 2);
        let (_c, mut rx_c) = connect(&gateway, "c", 3);

        assert!(gateway.subscribe("a", ChannelKey::Room(10)));
        assert!(gateway.subscribe("b", ChannelKey::Room(10)));
        assert!(!gateway.subscribe("b", ChannelKey::Room(10)));

        let recipients = gateway.broadcast(ChannelKey::Room(10), &ping(), Some("a"));
        assert_eq!(recipients, vec![2]);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());

        assert!(gateway.unsubscribe("b", ChannelKey::Room(10)));
        assert!(gateway.broadcast(ChannelKey::Room(10), &ping(), Some("a")).is_empty());
    }

    #[test]
    fn test_second_connection_replaces_first() {
        let gateway = Gateway::new();
        let (_first, _rx1) = connect(&gateway, "first", 1);
        gateway.subscribe("first", ChannelKey::Room(5));

        let (tx, _rx2) = mpsc::unbounded_channel();
        let (_second, replaced) = gateway.register("second", 1, "user1", tx);
        assert_eq!(replaced.map(|s| s.connection_id.clone()).as_deref(), Some("first"));
        assert_eq!(gateway.connection_count(), 1);
        assert!(gateway.broadcast(ChannelKey::Room(5), &ping(), None).is_empty());

        // The replaced connection's late teardown finds nothing to remove.
        assert!(gateway.unregister("first").is_none());
        assert!(gateway.is_online(1));

        let removed = gateway.unregister("second").unwrap();
        assert!(removed.was_active);
        assert!(!gateway.is_online(1));
        assert!(gateway.unregister("second").is_none());
    }

    #[test]
    fn test_send_to_user_and_broadcast_all() {
        let gateway = Gateway::new();
        let (_a, mut rx_a) = connect(&gateway, "a", 1);
        let (_b, mut rx_b) = connect(&gateway, "b", 2);

        assert!(gateway.send_to_user(2, ping()));
        assert!(!gateway.send_to_user(3, ping()));
        assert!(rx_b.try_recv().is_ok());

        assert_eq!(gateway.broadcast_all(&ping(), Some("b")), 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(gateway.online_user_ids(), HashSet::from([1, 2]));
    }

    #[test]
    fn test_closed_receiver_is_not_a_recipient() {
        let gateway = Gateway::new();
        let (_a, rx_a) = connect(&gateway, "a", 1);
        gateway.subscribe("a", ChannelKey::PrivateChat(4));
        drop(rx_a);

        assert!(gateway.broadcast(ChannelKey::PrivateChat(4), &ping(), None).is_empty());
    }

    #[tokio::test]
    async fn test_user_lock_is_per_user() {
        let gateway = Arc::new(Gateway::new());
        let held = gateway.lock_user(1).await;

        // Another user is not blocked.
        drop(gateway.lock_user(2).await);

        let waiter = {
            let gateway = gateway.clone();
            tokio::spawn(async move { drop(gateway.lock_user(1).await) })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
    }
}
