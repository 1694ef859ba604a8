//! Wire protocol for Marketroom.
//!
//! - **Types** ([`Envelope`], [`ClientIntent`], [`ServerEvent`],
//!   [`RoomSnapshot`], ...) — the messages that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEnvelope, ClientIntent, ClientPayload, CompanyView, Envelope, Phase,
    PlayerId, PlayerView, Recipient, RoomKey, RoomListEntry, RoomSnapshot,
    ServerEnvelope, ServerEvent, ServerPayload, SystemMessage,
};
