//! Per-connection handler: handshake, intent dispatch, and event forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version → new or resumed session
//!   2. Send HandshakeAck (with the token needed to resume later)
//!   3. Loop: forward room events to the client while receiving envelopes

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use marketroom_protocol::{
    ClientEnvelope, ClientIntent, ClientPayload, Codec, PlayerId, ProtocolError, RoomKey,
    ServerEnvelope, ServerEvent, ServerPayload, SystemMessage,
};
use marketroom_room::{PlayerSender, RoomAction, RoomError};
use marketroom_transport::{Connection, WebSocketConnection};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::server::{ServerState, PROTOCOL_VERSION};
use crate::MarketroomError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Releases the player's seat when the handler exits, however it exits.
///
/// `Drop` is synchronous, so the async cleanup runs in a spawned task.
struct SessionGuard<C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.release(player_id).await;
        });
    }
}

/// Frames everything the server sends on one connection.
struct Outbox<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<'a, C: Codec> Outbox<'a, C> {
    fn new(conn: &'a WebSocketConnection, codec: &'a C) -> Self {
        Self {
            conn,
            codec,
            seq: 0,
            start: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(&mut self, payload: ServerPayload) -> Result<(), MarketroomError> {
        let envelope = ServerEnvelope {
            seq: self.seq,
            timestamp: self.elapsed_ms(),
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn system(&mut self, msg: SystemMessage) -> Result<(), MarketroomError> {
        self.send(ServerPayload::System(msg)).await
    }

    async fn event(&mut self, event: ServerEvent) -> Result<(), MarketroomError> {
        self.send(ServerPayload::Event(event)).await
    }

    /// Private error reply; never seen by anyone else.
    async fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), MarketroomError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }
}

/// Just enough of an envelope to tell a broken intent from line noise.
#[derive(Deserialize)]
struct EnvelopeProbe {
    payload: PayloadProbe,
}

#[derive(Deserialize)]
struct PayloadProbe {
    #[serde(rename = "type")]
    kind: String,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), MarketroomError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let mut outbox = Outbox::new(&conn, &state.codec);

    // --- Step 1: Handshake ---
    let (guard, resumed) = perform_handshake(&conn, &state, &mut outbox).await?;
    let player_id = guard.player_id;
    tracing::info!(%conn_id, %player_id, resumed, "player connected");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerEvent>();
    if resumed {
        match state.rooms.lock().await.reconnect(player_id, events_tx.clone()).await {
            Ok(Some(room_key)) => tracing::info!(%player_id, %room_key, "seat restored"),
            Ok(None) => {}
            Err(e) => tracing::debug!(%player_id, error = %e, "could not restore seat"),
        }
    }

    // --- Step 2: Message loop ---
    let mut last_seen = tokio::time::Instant::now();
    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                outbox.event(event).await?;
            }
            _ = tokio::time::sleep_until(last_seen + state.idle_timeout) => {
                tracing::info!(%player_id, "connection timed out");
                break;
            }
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        break;
                    }
                };
                last_seen = tokio::time::Instant::now();

                let envelope: ClientEnvelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        reject_undecodable(&state.codec, &mut outbox, player_id, &data, e).await?;
                        continue;
                    }
                };

                match envelope.payload {
                    ClientPayload::System(msg) => {
                        let should_close =
                            handle_system_message(&state, &mut outbox, player_id, msg).await?;
                        if should_close {
                            break;
                        }
                    }
                    ClientPayload::Intent(intent) => {
                        let kind = intent.kind();
                        if let Err(e) = handle_intent(&state, player_id, intent, &events_tx).await {
                            if matches!(e, RoomError::NotInRoom(..)) {
                                tracing::warn!(%player_id, intent = kind, error = %e, "intent from non-member");
                            } else {
                                tracing::debug!(%player_id, intent = kind, error = %e, "intent rejected");
                            }
                            outbox.error(e.code(), e.to_string()).await?;
                        }
                    }
                }
            }
        }
    }

    let _ = conn.close().await;
    // guard drops here → the seat is released.
    Ok(())
}

/// Receives the Handshake, then creates or resumes the session and sends
/// the ack. Returns the guard owning the session and whether it was resumed.
///
/// The guard exists as soon as the session is live, so a failed ack still
/// hands the seat back to the grace-period sweep.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
    outbox: &mut Outbox<'_, C>,
) -> Result<(SessionGuard<C>, bool), MarketroomError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: ClientEnvelope = state.codec.decode(&data)?;

    let (version, resume_token) = match envelope.payload {
        ClientPayload::System(SystemMessage::Handshake {
            version,
            resume_token,
        }) => (version, resume_token),
        _ => {
            outbox.error(400, "expected Handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be Handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        outbox
            .error(
                400,
                format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            )
            .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let resumed = resume_token.is_some();
    let session = {
        let mut sessions = state.sessions.lock().await;
        match resume_token {
            Some(token) => sessions
                .reconnect(&token)
                .map(|s| (s.player_id, s.reconnect_token.clone())),
            None => {
                let s = sessions.create();
                Ok((s.player_id, s.reconnect_token.clone()))
            }
        }
    };
    let (player_id, session_token) = match session {
        Ok(session) => session,
        Err(e) => {
            outbox.error(e.code(), e.to_string()).await?;
            return Err(e.into());
        }
    };
    let guard = SessionGuard {
        player_id,
        state: Arc::clone(state),
    };

    outbox
        .system(SystemMessage::HandshakeAck {
            player_id,
            session_token,
            server_time: unix_millis(),
        })
        .await?;

    Ok((guard, resumed))
}

/// Handles a system message. Returns `true` if the connection should close.
async fn handle_system_message<C: Codec>(
    state: &ServerState<C>,
    outbox: &mut Outbox<'_, C>,
    player_id: PlayerId,
    msg: SystemMessage,
) -> Result<bool, MarketroomError> {
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            let server_time = outbox.elapsed_ms();
            outbox
                .system(SystemMessage::HeartbeatAck {
                    client_time,
                    server_time,
                })
                .await?;
        }

        SystemMessage::ListRooms => {
            let rooms = state.rooms.lock().await.list_rooms().await;
            outbox.system(SystemMessage::RoomList { rooms }).await?;
        }

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Ok(true);
        }

        SystemMessage::Handshake { .. } => {
            outbox.error(400, "handshake already completed").await?;
        }

        _ => {
            tracing::debug!(%player_id, "ignoring unexpected system message");
        }
    }

    Ok(false)
}

/// Routes a game intent. Membership changes go through the registry; the
/// rest go straight to the player's room so other rooms aren't held up.
async fn handle_intent<C: Codec>(
    state: &ServerState<C>,
    player_id: PlayerId,
    intent: ClientIntent,
    events: &PlayerSender,
) -> Result<(), RoomError> {
    let room_key = intent.room_key().cloned();
    let room_key = room_key.as_ref();
    match intent {
        ClientIntent::JoinGame { display_name, .. } => {
            let mut rooms = state.rooms.lock().await;
            // The snapshot itself arrives on `events`.
            rooms
                .join(player_id, &display_name, room_key, events.clone())
                .await?;
            Ok(())
        }
        ClientIntent::LeaveGame { .. } => {
            let mut rooms = state.rooms.lock().await;
            rooms.membership(player_id, room_key)?;
            rooms.leave(player_id).await?;
            Ok(())
        }
        ClientIntent::KickPlayer { target_id, .. } => {
            let mut rooms = state.rooms.lock().await;
            rooms.kick(player_id, target_id, room_key).await
        }
        ClientIntent::AddCompany { name, .. } => {
            act(state, player_id, room_key, RoomAction::AddCompany { name }).await
        }
        ClientIntent::DeleteCompany { name, .. } => {
            act(state, player_id, room_key, RoomAction::DeleteCompany { name }).await
        }
        ClientIntent::StartInvestment { .. } => {
            act(state, player_id, room_key, RoomAction::StartRound).await
        }
        ClientIntent::SubmitAllInvestments { investments, .. } => {
            act(state, player_id, room_key, RoomAction::Submit { investments }).await
        }
        ClientIntent::ResetGame { .. } => act(state, player_id, room_key, RoomAction::Reset).await,
        ClientIntent::RequestState { .. } => {
            act(state, player_id, room_key, RoomAction::RequestState).await
        }
    }
}

async fn act<C: Codec>(
    state: &ServerState<C>,
    player_id: PlayerId,
    room_key: Option<&RoomKey>,
    action: RoomAction,
) -> Result<(), RoomError> {
    let handle = state.rooms.lock().await.handle_for(player_id, room_key)?;
    handle.act(player_id, action).await
}

/// A frame that isn't a valid envelope. Broken intents get a 400 so the
/// client knows its request went nowhere; anything else is dropped.
async fn reject_undecodable<C: Codec>(
    codec: &C,
    outbox: &mut Outbox<'_, C>,
    player_id: PlayerId,
    data: &[u8],
    error: ProtocolError,
) -> Result<(), MarketroomError> {
    let is_intent = codec
        .decode::<EnvelopeProbe>(data)
        .map(|probe| probe.payload.kind == "intent")
        .unwrap_or(false);

    if is_intent {
        tracing::debug!(%player_id, %error, "malformed intent");
        outbox.error(400, format!("invalid intent: {error}")).await
    } else {
        tracing::debug!(%player_id, %error, "failed to decode envelope");
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
