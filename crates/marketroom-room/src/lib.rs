//! The Marketroom game coordinator.
//!
//! Each room is a Tokio task (actor) that owns a [`GameRoom`]: players join,
//! the host curates companies and opens a round, everyone submits
//! investments at once, and the round settles when the last seated player
//! has submitted.
//!
//! # Key types
//!
//! - [`GameRoom`]: the synchronous per-room state machine
//! - [`settle`]: the pure settlement math
//! - [`RoomRegistry`]: creates/destroys rooms, tracks who sits where
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`GameConfig`]: capital, growth cap, default room

mod config;
mod error;
mod game;
mod registry;
mod room;
mod settlement;

pub use config::GameConfig;
pub use error::RoomError;
pub use game::{GameRoom, Outbound};
pub use registry::RoomRegistry;
pub use room::{PlayerSender, RoomAction, RoomHandle, RoomInfo};
pub use settlement::{settle, CompanyOutcome, Settlement, Submission};
