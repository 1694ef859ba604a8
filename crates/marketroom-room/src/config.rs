//! Game configuration.

use serde::{Deserialize, Serialize};

/// Tunables shared by every room the registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Money each player holds on join and after every reset.
    pub starting_capital: u64,

    /// Growth (percent) awarded to a company that attracts all of the
    /// money invested in a round. Shares scale linearly below that.
    pub max_growth: f64,

    /// Room used when an intent carries no room key.
    pub default_room_key: String,

    /// Upper bound, in characters, for display and company names.
    pub max_name_len: usize,

    /// Bound of each room actor's command channel.
    pub command_channel_size: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_capital: 100_000,
            max_growth: 30.0,
            default_room_key: "lobby".to_string(),
            max_name_len: 32,
            command_channel_size: 64,
        }
    }
}

impl GameConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// - `max_growth` must be finite and non-negative, else the default.
    /// - `max_name_len` and `command_channel_size` are at least 1.
    /// - an empty `default_room_key` falls back to the default.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if !self.max_growth.is_finite() || self.max_growth < 0.0 {
            tracing::warn!(
                max_growth = self.max_growth,
                "max_growth out of range, using default"
            );
            self.max_growth = defaults.max_growth;
        }
        if self.default_room_key.trim().is_empty() {
            self.default_room_key = defaults.default_room_key;
        }
        self.max_name_len = self.max_name_len.max(1);
        self.command_channel_size = self.command_channel_size.max(1);
        self
    }
}
