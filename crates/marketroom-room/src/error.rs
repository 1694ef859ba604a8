//! Error types for the room layer.

use marketroom_protocol::{Phase, PlayerId, RoomKey};

/// Why a room rejected a request.
///
/// A rejected request never changes room state; the caller turns the
/// error into a private reply for the requesting player only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// A non-host tried a host-only action.
    #[error("only the host can {action}")]
    Unauthorized { player: PlayerId, action: &'static str },

    /// The action isn't valid in the room's current phase.
    #[error("cannot {action} while the room is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },

    /// A company with this exact name already exists.
    #[error("company {0:?} already exists")]
    DuplicateEntity(String),

    /// No company with this name.
    #[error("company {0:?} does not exist")]
    UnknownEntity(String),

    /// The submission adds up to more than the player holds.
    #[error("investments total {requested} but only {available} is available")]
    OverBudget { requested: u64, available: u64 },

    /// No room is registered under this key.
    #[error("room {0} not found")]
    UnknownRoom(RoomKey),

    /// The player isn't seated in the room.
    #[error("player {0} is not in this room")]
    UnknownPlayer(PlayerId),

    /// The player addressed a room other than the one they sit in.
    #[error("player {0} is not in room {1}")]
    NotInRoom(PlayerId, RoomKey),

    /// The player already sits in a room.
    #[error("player {0} is already in room {1}")]
    AlreadyInRoom(PlayerId, RoomKey),

    /// The host can't kick themselves.
    #[error("the host cannot be kicked")]
    CannotKickHost,

    /// Empty or oversized display/company name.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The room actor stopped or its channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomKey),
}

impl RoomError {
    /// HTTP-style status code for the private `error` reply.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidName(_) => 400,
            Self::Unauthorized { .. } | Self::CannotKickHost => 403,
            Self::UnknownEntity(_)
            | Self::UnknownRoom(_)
            | Self::UnknownPlayer(_)
            | Self::NotInRoom(..) => 404,
            Self::InvalidPhase { .. }
            | Self::DuplicateEntity(_)
            | Self::AlreadyInRoom(..) => 409,
            Self::OverBudget { .. } => 422,
            Self::Unavailable(_) => 503,
        }
    }
}
