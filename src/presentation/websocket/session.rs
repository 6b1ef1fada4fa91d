//! Gateway Connection Lifecycle
//!
//! `Connecting -> Bound -> Disconnected`. `Disconnected` is terminal.

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, token verified, no connection id yet
    Connecting,
    /// Owns this connection id; the hub binds it and must later unbind it
    Bound { connection_id: String },
    Disconnected,
}

/// Per-connection state owned by the socket task.
#[derive(Debug)]
pub struct SessionState {
    pub user_id: i64,
    state: ConnectionState,
}

impl SessionState {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Bound connection id, if any
    pub fn connection_id(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Bound { connection_id } => Some(connection_id),
            _ => None,
        }
    }

    /// `Connecting -> Bound`. Returns `false` from any other state.
    pub fn bind(&mut self, connection_id: impl Into<String>) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Bound {
            connection_id: connection_id.into(),
        };
        true
    }

    /// Move to `Disconnected`.
    ///
    /// Returns the connection id the first time a bound session closes, so the
    /// caller runs the unbind exactly once.
    pub fn close(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Bound { connection_id } => Some(connection_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut session = SessionState::new(7);
        assert_eq!(session.state(), &ConnectionState::Connecting);
        assert!(session.connection_id().is_none());

        assert!(session.bind("conn-1"));
        assert_eq!(session.connection_id(), Some("conn-1"));
        assert!(!session.bind("conn-2"));

        assert_eq!(session.close().as_deref(), Some("conn-1"));
        assert_eq!(session.state(), &ConnectionState::Disconnected);
        assert!(session.close().is_none());
        assert!(!session.bind("conn-3"));
    }

    #[test]
    fn test_close_before_bind_has_nothing_to_release() {
        let mut session = SessionState::new(7);
        assert!(session.close().is_none());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
    }
}
