//! Player session identity for Marketroom.
//!
//! A transport connection dies with a page reload; a session doesn't. This
//! crate hands every new client a stable [`PlayerId`] plus a secret
//! reconnection token, and keeps the session alive for a grace period
//! after the connection drops so the player can resume their seat.
//!
//! ```text
//! Room Layer (above)      ← keys players by PlayerId
//!     ↕
//! Session Layer (this)    ← PlayerId ↔ token, connected / disconnected
//!     ↕
//! Protocol Layer (below)  ← PlayerId type
//! ```
//!
//! [`PlayerId`]: marketroom_protocol::PlayerId

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
