//! Room registry: creates rooms on demand, tracks who sits where, and
//! tears rooms down once they empty.

use std::collections::HashMap;

use marketroom_protocol::{PlayerId, RoomKey, RoomListEntry, RoomSnapshot};

use crate::room::spawn_room;
use crate::{GameConfig, PlayerSender, RoomError, RoomHandle};

/// Every live room, plus the player → room index.
///
/// Owned by the server and passed in rather than held globally, so tests
/// can build one with a handful of rooms. A player sits in at most one
/// room at a time.
pub struct RoomRegistry {
    config: GameConfig,
    rooms: HashMap<RoomKey, RoomHandle>,
    player_rooms: HashMap<PlayerId, RoomKey>,
}

impl RoomRegistry {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config: config.validated(),
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The requested key, or the default room when none was given.
    pub fn resolve_key(&self, requested: Option<&RoomKey>) -> RoomKey {
        requested
            .cloned()
            .unwrap_or_else(|| RoomKey::new(self.config.default_room_key.clone()))
    }

    pub fn get(&self, key: &RoomKey) -> Option<RoomHandle> {
        self.rooms.get(key).cloned()
    }

    /// Returns the room under `key`, spawning it first if needed.
    pub fn create(&mut self, key: RoomKey) -> RoomHandle {
        if let Some(handle) = self.rooms.get(&key) {
            return handle.clone();
        }
        let handle = spawn_room(key.clone(), self.config.clone());
        self.rooms.insert(key.clone(), handle.clone());
        tracing::info!(room_key = %key, rooms = self.rooms.len(), "room created");
        handle
    }

    /// Stops a room's actor and forgets everyone seated in it.
    /// Returns `false` if no such room exists.
    pub async fn destroy(&mut self, key: &RoomKey) -> bool {
        let Some(handle) = self.rooms.remove(key) else {
            return false;
        };
        self.player_rooms.retain(|_, room| room != key);
        let _ = handle.shutdown().await;
        tracing::info!(room_key = %key, rooms = self.rooms.len(), "room destroyed");
        true
    }

    /// Seats a player, creating the room if it doesn't exist yet.
    pub async fn join(
        &mut self,
        player: PlayerId,
        display_name: &str,
        requested: Option<&RoomKey>,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        if let Some(current) = self.player_rooms.get(&player) {
            return Err(RoomError::AlreadyInRoom(player, current.clone()));
        }

        let key = self.resolve_key(requested);
        let existed = self.rooms.contains_key(&key);
        let handle = self.create(key.clone());

        match handle.join(player, display_name, sender).await {
            Ok(snapshot) => {
                self.player_rooms.insert(player, key);
                Ok(snapshot)
            }
            Err(err) => {
                // Don't leave an empty room behind for a failed first join.
                if !existed {
                    self.destroy(&key).await;
                }
                Err(err)
            }
        }
    }

    /// Removes a player from their room, destroying it if it is now empty.
    /// Returns the room they left.
    pub async fn leave(&mut self, player: PlayerId) -> Result<RoomKey, RoomError> {
        let key = self
            .player_rooms
            .remove(&player)
            .ok_or(RoomError::UnknownPlayer(player))?;
        let handle = self
            .get(&key)
            .ok_or_else(|| RoomError::UnknownRoom(key.clone()))?;

        let remaining = handle.leave(player).await?;
        if remaining == 0 {
            self.destroy(&key).await;
        }
        Ok(key)
    }

    /// Host `by` removes `target` from the room `by` sits in.
    pub async fn kick(
        &mut self,
        by: PlayerId,
        target: PlayerId,
        requested: Option<&RoomKey>,
    ) -> Result<(), RoomError> {
        let key = self.membership(by, requested)?;
        let handle = self
            .get(&key)
            .ok_or_else(|| RoomError::UnknownRoom(key.clone()))?;

        let remaining = handle.kick(by, target).await?;
        self.player_rooms.remove(&target);
        if remaining == 0 {
            self.destroy(&key).await;
        }
        Ok(())
    }

    /// The room `player` sits in. If `requested` names a different room the
    /// request is rejected.
    pub fn membership(
        &self,
        player: PlayerId,
        requested: Option<&RoomKey>,
    ) -> Result<RoomKey, RoomError> {
        match (self.player_rooms.get(&player), requested) {
            (Some(current), Some(requested)) if current != requested => {
                Err(RoomError::NotInRoom(player, requested.clone()))
            }
            (Some(current), _) => Ok(current.clone()),
            (None, requested) => Err(RoomError::NotInRoom(player, self.resolve_key(requested))),
        }
    }

    /// Handle for the room `player` sits in, for actions that don't
    /// change membership. The caller can drop the registry lock before
    /// awaiting the room.
    pub fn handle_for(
        &self,
        player: PlayerId,
        requested: Option<&RoomKey>,
    ) -> Result<RoomHandle, RoomError> {
        let key = self.membership(player, requested)?;
        self.get(&key).ok_or(RoomError::UnknownRoom(key))
    }

    /// Marks a seated player disconnected, or reconnected on a new channel.
    /// Does nothing for players who aren't seated anywhere.
    pub async fn set_connected(
        &self,
        player: PlayerId,
        sender: Option<PlayerSender>,
    ) -> Result<(), RoomError> {
        let Some(key) = self.player_rooms.get(&player) else {
            return Ok(());
        };
        let handle = self
            .get(key)
            .ok_or_else(|| RoomError::UnknownRoom(key.clone()))?;
        handle.set_connected(player, sender).await
    }

    /// Reattaches a resumed session to its seat. The room sends the player
    /// a fresh snapshot. Returns the room key, or `None` if the player
    /// wasn't seated.
    pub async fn reconnect(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<Option<RoomKey>, RoomError> {
        let key = self.player_room(player).cloned();
        if key.is_some() {
            self.set_connected(player, Some(sender)).await?;
        }
        Ok(key)
    }

    pub fn player_room(&self, player: PlayerId) -> Option<&RoomKey> {
        self.player_rooms.get(&player)
    }

    /// Summaries of every live room, sorted by key.
    pub async fn list_rooms(&self) -> Vec<RoomListEntry> {
        let mut entries = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            match handle.info().await {
                Ok(info) => entries.push(RoomListEntry {
                    room_key: info.key,
                    player_count: info.player_count,
                    phase: info.phase,
                }),
                Err(err) => {
                    tracing::warn!(room_key = %handle.key(), %err, "room did not report info");
                }
            }
        }
        entries.sort_by(|a, b| a.room_key.cmp(&b.room_key));
        entries
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_keys(&self) -> Vec<RoomKey> {
        let mut keys: Vec<RoomKey> = self.rooms.keys().cloned().collect();
        keys.sort();
        keys
    }
}
