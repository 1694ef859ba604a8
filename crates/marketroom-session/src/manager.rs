//! The session manager: every player the server currently knows about.
//!
//! `SessionManager` is a plain single-owner structure. The server wraps it
//! in a `tokio::sync::Mutex`; nothing here locks.

use std::collections::HashMap;
use std::time::Instant;

use marketroom_protocol::PlayerId;
use rand::Rng;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Issues player identities and tracks their connection state.
///
/// ```text
/// create() ──→ disconnect() ──→ reconnect()
///    │               │                │
///    ▼               ▼                ▼
/// [Connected]  [Disconnected]    [Connected]
///                    │
///                    ▼ expire_stale() after the grace period
///                [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,

    /// Reconnection token → owner. Kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,

    next_id: u64,

    config: SessionConfig,
}

impl SessionManager {
    /// Creates a new, empty session manager with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a brand-new session with a fresh `PlayerId` and token.
    pub fn create(&mut self) -> &Session {
        let player_id = PlayerId(self.next_id);
        self.next_id += 1;

        let token = generate_token();
        self.tokens.insert(token.clone(), player_id);
        tracing::info!(%player_id, "session created");

        self.sessions.entry(player_id).or_insert(Session {
            player_id,
            state: SessionState::Connected,
            reconnect_token: token,
        })
    }

    /// Marks a player as disconnected and starts the grace period.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };

        tracing::info!(%player_id, "player disconnected, grace period started");
        Ok(())
    }

    /// Resumes a disconnected session using its token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`] — token not recognized
    /// - [`SessionError::SessionExpired`] — grace period elapsed
    /// - [`SessionError::AlreadyConnected`] — session is attached elsewhere
    pub fn reconnect(&mut self, token: &str) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;

        let grace = self.config.grace();
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match session.state {
            SessionState::Disconnected { since } => {
                // Left as Disconnected: expire_stale reports it so the
                // seat still gets released.
                if since.elapsed() > grace {
                    return Err(SessionError::SessionExpired(player_id));
                }
                session.state = SessionState::Connected;
                tracing::info!(%player_id, "player reconnected");
                Ok(session)
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(player_id)),
            SessionState::Expired => Err(SessionError::SessionExpired(player_id)),
        }
    }

    /// Expires every disconnected session whose grace period has elapsed.
    ///
    /// Returns the expired player ids so the caller can remove them from
    /// their rooms before calling [`cleanup_expired`](Self::cleanup_expired).
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.config.grace();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id);
                    tracing::info!(
                        player_id = %session.player_id,
                        "session expired (grace period elapsed)"
                    );
                }
            }
        }

        expired.sort();
        expired
    }

    /// Drops all expired sessions and invalidates their tokens.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                self.tokens.remove(&session.reconnect_token);
                false
            } else {
                true
            }
        });
    }

    /// Ends a session immediately, whatever its state.
    pub fn remove(&mut self, player_id: PlayerId) -> Option<Session> {
        let session = self.sessions.remove(&player_id)?;
        self.tokens.remove(&session.reconnect_token);
        tracing::debug!(%player_id, "session removed");
        Some(session)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Number of sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
