//! Session types: the server's record of one player across connections.

use std::time::{Duration, Instant};

use marketroom_protocol::PlayerId;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected player keeps their seat before
    /// the session expires and they are removed from their room.
    ///
    /// Default: 30 seconds. `0` turns every disconnect into an immediate
    /// departure.
    pub reconnect_grace_secs: u64,
}

impl SessionConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
        }
    }
}

/// The current state of a player's session.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Attached to a live connection.
    Connected,

    /// Connection dropped at `since`; resumable until `since + grace`.
    Disconnected { since: Instant },

    /// Grace period over. Waiting for `cleanup_expired`.
    Expired,
}

/// A single player's session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,

    pub state: SessionState,

    /// Secret the client presents in its handshake to resume this session.
    /// 32 hex characters (128 bits).
    pub reconnect_token: String,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected)
    }
}
