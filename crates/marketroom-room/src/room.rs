//! Room actor: a Tokio task that owns one [`GameRoom`].
//!
//! The outside world talks to it through a [`RoomHandle`]. Commands are
//! processed one at a time, so every operation on a room is serialised
//! while separate rooms run concurrently.

use std::collections::{BTreeMap, HashMap};

use marketroom_protocol::{Phase, PlayerId, Recipient, RoomKey, RoomSnapshot, ServerEvent};
use tokio::sync::{mpsc, oneshot};

use crate::game::{GameRoom, Outbound};
use crate::{GameConfig, RoomError};

/// Channel for delivering events to one player's connection handler.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// A game action from a seated player that doesn't change membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAction {
    AddCompany { name: String },
    DeleteCompany { name: String },
    StartRound,
    Submit { investments: BTreeMap<String, i64> },
    Reset,
    RequestState,
}

pub(crate) enum RoomCommand {
    Join {
        player: PlayerId,
        name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },
    /// Replies with the number of players left.
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Kick {
        by: PlayerId,
        target: PlayerId,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Act {
        player: PlayerId,
        action: RoomAction,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// `Some(sender)` marks the player connected and routes to the new
    /// channel; `None` marks them disconnected.
    SetConnected {
        player: PlayerId,
        sender: Option<PlayerSender>,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown,
}

/// Room metadata, without the full game state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub key: RoomKey,
    pub phase: Phase,
    pub player_count: usize,
    pub host: Option<PlayerId>,
    pub version: u64,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    key: RoomKey,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Seats a player; events for them go to `sender` from now on.
    pub async fn join(
        &self,
        player: PlayerId,
        name: impl Into<String>,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let name = name.into();
        self.request(|reply| RoomCommand::Join {
            player,
            name,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a player. Returns how many remain.
    pub async fn leave(&self, player: PlayerId) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply })
            .await?
    }

    /// Host removes `target`. Returns how many remain.
    pub async fn kick(&self, by: PlayerId, target: PlayerId) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Kick { by, target, reply })
            .await?
    }

    pub async fn act(&self, player: PlayerId, action: RoomAction) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Act {
            player,
            action,
            reply,
        })
        .await?
    }

    pub async fn set_connected(
        &self,
        player: PlayerId,
        sender: Option<PlayerSender>,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetConnected {
            player,
            sender,
            reply,
        })
        .await?
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Asks the actor to stop. Pending commands behind it are dropped.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.key.clone()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.key.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.key.clone()))
    }
}

struct RoomActor {
    room: GameRoom,
    senders: HashMap<PlayerId, PlayerSender>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_key = %self.room.key(), "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    player,
                    name,
                    sender,
                    reply,
                } => {
                    let result = self.handle_join(player, &name, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { player, reply } => {
                    let result = self.room.leave(player).map(|events| {
                        self.senders.remove(&player);
                        self.dispatch(events);
                        self.room.len()
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Kick { by, target, reply } => {
                    let result = self.room.kick(by, target).map(|events| {
                        // Dispatch first so the private notice still reaches
                        // the target.
                        self.dispatch(events);
                        self.senders.remove(&target);
                        self.room.len()
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Act {
                    player,
                    action,
                    reply,
                } => {
                    let result = self.handle_action(player, action);
                    let _ = reply.send(result);
                }
                RoomCommand::SetConnected {
                    player,
                    sender,
                    reply,
                } => {
                    let result = self.handle_set_connected(player, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.room.snapshot());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_key = %self.room.key(), "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_key = %self.room.key(), "room actor stopped");
    }

    fn handle_join(
        &mut self,
        player: PlayerId,
        name: &str,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let events = self.room.join(player, name)?;
        self.senders.insert(player, sender);
        self.dispatch(events);
        Ok(self.room.snapshot())
    }

    fn handle_action(&mut self, player: PlayerId, action: RoomAction) -> Result<(), RoomError> {
        let result = match action {
            RoomAction::AddCompany { name } => self.room.add_company(player, &name),
            RoomAction::DeleteCompany { name } => self.room.delete_company(player, &name),
            RoomAction::StartRound => self.room.start_round(player),
            RoomAction::Submit { investments } => self.room.submit(player, &investments),
            RoomAction::Reset => self.room.reset(player),
            RoomAction::RequestState => self.room.request_state(player),
        };

        match result {
            Ok(events) => {
                self.dispatch(events);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(
                    room_key = %self.room.key(),
                    player_id = %player,
                    %err,
                    "action rejected"
                );
                Err(err)
            }
        }
    }

    fn handle_set_connected(
        &mut self,
        player: PlayerId,
        sender: Option<PlayerSender>,
    ) -> Result<(), RoomError> {
        let connected = sender.is_some();
        let mut events = self.room.set_connected(player, connected)?;

        match sender {
            Some(sender) => {
                self.senders.insert(player, sender);
                // A fresh channel always gets a snapshot, even if the flag
                // didn't change.
                if events.is_empty() {
                    events = self.room.request_state(player)?;
                }
            }
            None => {
                self.senders.remove(&player);
            }
        }

        tracing::debug!(
            room_key = %self.room.key(),
            player_id = %player,
            connected,
            "connection status changed"
        );
        self.dispatch(events);
        Ok(())
    }

    /// Sends events to their recipients among the currently seated players.
    fn dispatch(&self, events: Outbound) {
        let seated = self.room.player_ids();
        for (recipient, event) in events {
            match recipient {
                Recipient::All => {
                    for pid in &seated {
                        self.send_to(*pid, event.clone());
                    }
                }
                Recipient::Player(pid) => self.send_to(pid, event),
                Recipient::AllExcept(excluded) => {
                    for pid in seated.iter().filter(|pid| **pid != excluded) {
                        self.send_to(*pid, event.clone());
                    }
                }
            }
        }
    }

    /// Drops the event if the player has no live channel.
    fn send_to(&self, player: PlayerId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&player) {
            let _ = sender.send(event);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            key: self.room.key().clone(),
            phase: self.room.phase(),
            player_count: self.room.len(),
            host: self.room.host(),
            version: self.room.version(),
        }
    }
}

/// Spawns a room actor and returns a handle to it.
pub(crate) fn spawn_room(key: RoomKey, config: GameConfig) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_channel_size);

    let actor = RoomActor {
        room: GameRoom::new(key.clone(), config),
        senders: HashMap::new(),
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomHandle { key, sender: tx }
}
