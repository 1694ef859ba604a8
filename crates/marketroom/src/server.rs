//! `MarketroomServer` builder, accept loop, and session sweeper.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use marketroom_protocol::{Codec, JsonCodec, PlayerId};
use marketroom_room::{GameConfig, RoomError, RoomRegistry};
use marketroom_session::{SessionConfig, SessionManager};
use marketroom_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::MarketroomError;

/// Clients must send this in their handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
///
/// Lock rule: never hold `sessions` and `rooms` at the same time.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

impl<C: Codec> ServerState<C> {
    /// Called when a player's connection goes away.
    ///
    /// With a reconnection window the seat is kept and flagged
    /// disconnected; without one the player leaves their room at once.
    pub(crate) async fn release(&self, player_id: PlayerId) {
        let immediate = self.sessions.lock().await.config().reconnect_grace_secs == 0;

        if immediate {
            self.sessions.lock().await.remove(player_id);
            let result = self.rooms.lock().await.leave(player_id).await;
            log_leave(player_id, result, "player left on disconnect");
            return;
        }

        // Flag the seat before the session becomes resumable, so a quick
        // reconnect can't have its new channel cleared afterwards.
        if let Err(e) = self.rooms.lock().await.set_connected(player_id, None).await {
            tracing::debug!(%player_id, error = %e, "could not flag player disconnected");
        }
        if let Err(e) = self.sessions.lock().await.disconnect(player_id) {
            tracing::debug!(%player_id, error = %e, "disconnect for unknown session");
        }
    }

    /// Removes players whose reconnection window has run out.
    /// Returns the expired ids.
    pub(crate) async fn sweep(&self) -> Vec<PlayerId> {
        let expired = self.sessions.lock().await.expire_stale();
        if expired.is_empty() {
            return expired;
        }

        {
            let mut rooms = self.rooms.lock().await;
            for &player_id in &expired {
                let result = rooms.leave(player_id).await;
                log_leave(player_id, result, "player removed after grace period");
            }
        }

        self.sessions.lock().await.cleanup_expired();
        expired
    }
}

fn log_leave(
    player_id: PlayerId,
    result: Result<marketroom_protocol::RoomKey, RoomError>,
    message: &'static str,
) {
    match result {
        Ok(room_key) => tracing::info!(%player_id, %room_key, "{message}"),
        // Not seated anywhere: nothing to do.
        Err(RoomError::UnknownPlayer(_)) => {}
        Err(e) => tracing::debug!(%player_id, error = %e, "leave failed"),
    }
}

/// Builder for configuring and starting a Marketroom server.
///
/// # Example
///
/// ```rust,no_run
/// use marketroom::prelude::*;
///
/// # async fn start() -> Result<(), MarketroomError> {
/// let server = MarketroomServer::builder()
///     .bind("0.0.0.0:8080")
///     .game_config(GameConfig {
///         starting_capital: 50_000,
///         ..GameConfig::default()
///     })
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct MarketroomServerBuilder {
    bind_addr: String,
    game_config: GameConfig,
    session_config: SessionConfig,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl MarketroomServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            game_config: GameConfig::default(),
            session_config: SessionConfig::default(),
            idle_timeout: Duration::from_secs(15),
            sweep_interval: Duration::from_secs(1),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// A connection that sends nothing (not even heartbeats) for this long
    /// is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// How often expired sessions are swept out of their rooms.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Binds the listener. Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<MarketroomServer<JsonCodec>, MarketroomError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            rooms: Mutex::new(RoomRegistry::new(self.game_config)),
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(MarketroomServer {
            transport,
            state,
            sweep_interval: self.sweep_interval.max(Duration::from_millis(1)),
        })
    }
}

impl Default for MarketroomServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Marketroom server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct MarketroomServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
    sweep_interval: Duration,
}

impl MarketroomServer<JsonCodec> {
    pub fn builder() -> MarketroomServerBuilder {
        MarketroomServerBuilder::new()
    }
}

impl<C: Codec> MarketroomServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), MarketroomError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Each connection gets its own handler task. A background task sweeps
    /// expired sessions every `sweep_interval`.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), MarketroomError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Marketroom server running");

        let sweeper = {
            let state = Arc::clone(&self.state);
            let period = self.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    state.sweep().await;
                }
            })
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        sweeper.abort();
        Ok(())
    }
}
