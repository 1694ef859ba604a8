//! Error types for the session layer.

use marketroom_protocol::PlayerId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The reconnection token doesn't match any session we issued.
    #[error("invalid reconnection token")]
    InvalidToken,

    /// The reconnection grace period elapsed before the player came back.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// The session is still attached to a live connection.
    #[error("player {0} already has an active connection")]
    AlreadyConnected(PlayerId),
}

impl SessionError {
    /// HTTP-style status code for the private `error` reply.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::InvalidToken => 401,
            Self::SessionExpired(_) => 410,
            Self::AlreadyConnected(_) => 409,
        }
    }
}
