//! # Marketroom
//!
//! Real-time multiplayer investment game server.
//!
//! Players connect over WebSocket, join a room, and play rounds: the host
//! lists companies, everyone invests at once, and the round settles when
//! the last player submits. Companies grow in proportion to the share of
//! money they attract.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketroom::prelude::*;
//!
//! # async fn start() -> Result<(), MarketroomError> {
//! let server = MarketroomServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::MarketroomError;
pub use server::{MarketroomServer, MarketroomServerBuilder, PROTOCOL_VERSION};

pub use marketroom_protocol as protocol;
pub use marketroom_room as room;
pub use marketroom_session as session;
pub use marketroom_transport as transport;

/// Everything needed to run a server or write a client against it.
pub mod prelude {
    pub use crate::{MarketroomError, MarketroomServer, MarketroomServerBuilder, PROTOCOL_VERSION};
    pub use marketroom_protocol::{
        ClientEnvelope, ClientIntent, ClientPayload, Codec, CompanyView, Envelope, JsonCodec,
        Phase, PlayerId, PlayerView, RoomKey, RoomListEntry, RoomSnapshot, ServerEnvelope,
        ServerEvent, ServerPayload, SystemMessage,
    };
    pub use marketroom_room::{GameConfig, RoomError};
    pub use marketroom_session::{SessionConfig, SessionError};
}
