//! Unified error type for the Marketroom server.

use marketroom_protocol::ProtocolError;
use marketroom_room::RoomError;
use marketroom_session::SessionError;
use marketroom_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// `#[from]` on each variant lets `?` convert layer errors directly.
#[derive(Debug, thiserror::Error)]
pub enum MarketroomError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode/decode failure or a protocol rule broken.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Unknown, expired, or already attached session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room rejected the request or is gone.
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use marketroom_protocol::{PlayerId, RoomKey};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: MarketroomError = err.into();
        assert!(matches!(err, MarketroomError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let err: MarketroomError = err.into();
        assert!(matches!(err, MarketroomError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: MarketroomError = SessionError::SessionExpired(PlayerId(4)).into();
        assert!(matches!(err, MarketroomError::Session(_)));
    }

    #[test]
    fn test_from_room_error_keeps_message() {
        let err: MarketroomError = RoomError::UnknownRoom(RoomKey::new("den")).into();
        assert!(matches!(err, MarketroomError::Room(_)));
        assert_eq!(err.to_string(), "room den not found");
    }
}
