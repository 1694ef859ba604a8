//! Core protocol types for Marketroom's wire format.
//!
//! Every type here travels on the wire as JSON. Client and server speak in
//! [`Envelope`]s; the payload is either framework plumbing
//! ([`SystemMessage`]) or game traffic ([`ClientIntent`] upstream,
//! [`ServerEvent`] downstream). All of these are closed, internally tagged
//! unions so malformed input is rejected at the boundary instead of being
//! passed through as loose objects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A server-assigned identifier for a player session.
///
/// Issued at handshake and kept across reconnects, so it is the key for
/// everything a room knows about a player (money, host role, submission).
/// Serialized as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A caller-chosen room name. Rooms are created lazily on first join.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(pub String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who inside a room should receive a server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every player seated in the room.
    All,
    /// One specific player (private replies, kick notices).
    Player(PlayerId),
    /// Everyone except one player.
    AllExcept(PlayerId),
}

// ---------------------------------------------------------------------------
// Room state views
// ---------------------------------------------------------------------------

/// The room's position in the round state machine.
///
/// ```text
/// Waiting ──(start)──→ Investing ──(all submitted)──→ Settled
///    ↑                                                  │
///    └──────────────────────(reset)─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Waiting,
    Investing,
    Settled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Investing => write!(f, "Investing"),
            Self::Settled => write!(f, "Settled"),
        }
    }
}

/// One player as shown to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub remaining_money: u64,
    /// Filled in at settlement; empty before.
    pub investments: BTreeMap<String, u64>,
    /// Filled in at settlement; `None` before.
    pub final_value: Option<f64>,
    /// `false` while the player is inside the reconnection grace period.
    pub connected: bool,
    /// Whether this player has a submission recorded for the current round.
    pub submitted: bool,
}

/// One investable company as shown to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyView {
    pub name: String,
    pub total_investment: u64,
    /// Percentage, `0.0..=max_growth`.
    pub growth: f64,
}

/// The complete serializable state of one room.
///
/// Rebroadcast in full after every state transition. `version` goes up by
/// exactly one per transition, so clients can drop stale snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_key: RoomKey,
    pub version: u64,
    pub phase: Phase,
    pub host_id: Option<PlayerId>,
    /// In join order.
    pub players: Vec<PlayerView>,
    /// In insertion order.
    pub companies: Vec<CompanyView>,
}

impl RoomSnapshot {
    /// Looks up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Looks up a company by name.
    pub fn company(&self, name: &str) -> Option<&CompanyView> {
        self.companies.iter().find(|c| c.name == name)
    }

    /// Player ids ordered by final value, best first.
    ///
    /// Ties (and players without a final value) keep join order.
    pub fn rankings(&self) -> Vec<PlayerId> {
        let mut ranked: Vec<&PlayerView> = self.players.iter().collect();
        // sort_by is stable, so equal values stay in join order.
        ranked.sort_by(|a, b| {
            let a = a.final_value.unwrap_or(f64::NEG_INFINITY);
            let b = b.final_value.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        ranked.into_iter().map(|p| p.id).collect()
    }
}

/// A summary of a room returned in room listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListEntry {
    pub room_key: RoomKey,
    pub player_count: usize,
    pub phase: Phase,
}

// ---------------------------------------------------------------------------
// Game traffic
// ---------------------------------------------------------------------------

/// Client → server game intents.
///
/// `room_key` is optional on the wire; a missing key means the server's
/// default room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientIntent {
    JoinGame {
        display_name: String,
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    AddCompany {
        name: String,
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    DeleteCompany {
        name: String,
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    StartInvestment {
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    /// Amounts are signed on the wire; negatives are clamped to zero.
    SubmitAllInvestments {
        investments: BTreeMap<String, i64>,
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    KickPlayer {
        target_id: PlayerId,
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    ResetGame {
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    LeaveGame {
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
    /// Asks for a private `gameState` refresh.
    RequestState {
        #[serde(default)]
        room_key: Option<RoomKey>,
    },
}

impl ClientIntent {
    /// The room this intent addresses, if the client named one.
    pub fn room_key(&self) -> Option<&RoomKey> {
        match self {
            Self::JoinGame { room_key, .. }
            | Self::AddCompany { room_key, .. }
            | Self::DeleteCompany { room_key, .. }
            | Self::StartInvestment { room_key }
            | Self::SubmitAllInvestments { room_key, .. }
            | Self::KickPlayer { room_key, .. }
            | Self::ResetGame { room_key }
            | Self::LeaveGame { room_key }
            | Self::RequestState { room_key } => room_key.as_ref(),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "joinGame",
            Self::AddCompany { .. } => "addCompany",
            Self::DeleteCompany { .. } => "deleteCompany",
            Self::StartInvestment { .. } => "startInvestment",
            Self::SubmitAllInvestments { .. } => "submitAllInvestments",
            Self::KickPlayer { .. } => "kickPlayer",
            Self::ResetGame { .. } => "resetGame",
            Self::LeaveGame { .. } => "leaveGame",
            Self::RequestState { .. } => "requestState",
        }
    }
}

/// Server → client game events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full snapshot. Follows every accepted state change.
    GameState { snapshot: RoomSnapshot },
    PlayerJoined {
        player: PlayerView,
        player_count: usize,
    },
    PlayerLeft {
        player_id: PlayerId,
        player_count: usize,
    },
    HostChanged { host_id: PlayerId },
    PlayerConnection {
        player_id: PlayerId,
        connected: bool,
    },
    CompanyAdded {
        company: CompanyView,
        company_count: usize,
    },
    CompanyDeleted {
        name: String,
        company_count: usize,
    },
    InvestmentStarted,
    PlayerSubmitted { player_id: PlayerId },
    AllPlayersSubmitted {
        snapshot: RoomSnapshot,
        rankings: Vec<PlayerId>,
    },
    GameReset,
    PlayerKicked { player_id: PlayerId },
    /// Private: sent only to the player who was removed.
    KickedFromGame { room_key: RoomKey },
}

// ---------------------------------------------------------------------------
// SystemMessage — framework plumbing
// ---------------------------------------------------------------------------

/// Messages the server itself handles, independent of game rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SystemMessage {
    /// Client → Server, first frame on every connection.
    /// `resume_token` is the `session_token` from an earlier ack.
    Handshake {
        version: u32,
        #[serde(default)]
        resume_token: Option<String>,
    },

    /// Server → Client. Keep `session_token` to reconnect after a drop.
    HandshakeAck {
        player_id: PlayerId,
        session_token: String,
        server_time: u64,
    },

    /// Either direction: "I'm going away."
    Disconnect { reason: String },

    Heartbeat { client_time: u64 },

    HeartbeatAck { client_time: u64, server_time: u64 },

    ListRooms,

    RoomList { rooms: Vec<RoomListEntry> },

    /// Server → Client, private to the requester. `code` follows HTTP
    /// conventions (400, 401, 403, 404, 409, 410, 422, 503).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What a client may put in an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientPayload {
    System(SystemMessage),
    Intent(ClientIntent),
}

/// What the server puts in an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerPayload {
    System(SystemMessage),
    Event(ServerEvent),
}

/// The top-level frame. Each side numbers its own envelopes with `seq`;
/// `timestamp` is milliseconds since the sender's connection started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}

/// Envelope sent by clients.
pub type ClientEnvelope = Envelope<ClientPayload>;

/// Envelope sent by the server.
pub type ServerEnvelope = Envelope<ServerPayload>;

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes are what browser clients parse, so these tests pin
    //! the serde attributes rather than round-tripping every variant.

    use serde_json::json;

    use super::*;

    fn player(id: u64, final_value: Option<f64>) -> PlayerView {
        PlayerView {
            id: PlayerId(id),
            name: format!("p{id}"),
            remaining_money: 0,
            investments: BTreeMap::new(),
            final_value,
            connected: true,
            submitted: true,
        }
    }

    fn snapshot(players: Vec<PlayerView>) -> RoomSnapshot {
        RoomSnapshot {
            room_key: RoomKey::new("lobby"),
            version: 3,
            phase: Phase::Settled,
            host_id: Some(PlayerId(1)),
            players,
            companies: vec![CompanyView {
                name: "Acme".into(),
                total_investment: 100,
                growth: 30.0,
            }],
        }
    }

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&PlayerId(42)).unwrap(), "42");
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_room_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomKey::new("room-a")).unwrap();
        assert_eq!(json, "\"room-a\"");
    }

    #[test]
    fn test_phase_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(Phase::Investing).unwrap(),
            json!("investing")
        );
        assert_eq!(Phase::default(), Phase::Waiting);
    }

    #[test]
    fn test_join_game_parses_camel_case_fields() {
        let intent: ClientIntent = serde_json::from_value(json!({
            "type": "joinGame",
            "displayName": "Ada",
            "roomKey": "room-a"
        }))
        .unwrap();

        assert_eq!(
            intent,
            ClientIntent::JoinGame {
                display_name: "Ada".into(),
                room_key: Some(RoomKey::new("room-a")),
            }
        );
        assert_eq!(intent.kind(), "joinGame");
    }

    #[test]
    fn test_intent_room_key_is_optional() {
        let intent: ClientIntent =
            serde_json::from_value(json!({ "type": "startInvestment" }))
                .unwrap();
        assert_eq!(intent.room_key(), None);
    }

    #[test]
    fn test_submit_all_investments_accepts_signed_amounts() {
        let intent: ClientIntent = serde_json::from_value(json!({
            "type": "submitAllInvestments",
            "investments": { "Acme": 40000, "Beta": -5 }
        }))
        .unwrap();

        match intent {
            ClientIntent::SubmitAllInvestments { investments, .. } => {
                assert_eq!(investments["Acme"], 40000);
                assert_eq!(investments["Beta"], -5);
            }
            other => panic!("expected submitAllInvestments, got {other:?}"),
        }
    }

    #[test]
    fn test_kick_player_parses_target_id() {
        let intent: ClientIntent = serde_json::from_value(json!({
            "type": "kickPlayer",
            "targetId": 9,
            "roomKey": "x"
        }))
        .unwrap();
        assert!(matches!(
            intent,
            ClientIntent::KickPlayer { target_id: PlayerId(9), .. }
        ));
    }

    #[test]
    fn test_unknown_intent_type_is_rejected() {
        let result: Result<ClientIntent, _> =
            serde_json::from_value(json!({ "type": "buyShop", "item": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_json_format() {
        let event = ServerEvent::PlayerJoined {
            player: player(2, None),
            player_count: 2,
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "playerJoined");
        assert_eq!(value["playerCount"], 2);
        assert_eq!(value["player"]["remainingMoney"], 0);
        assert!(value["player"]["finalValue"].is_null());
    }

    #[test]
    fn test_unit_server_event_has_only_a_tag() {
        let value = serde_json::to_value(ServerEvent::GameReset).unwrap();
        assert_eq!(value, json!({ "type": "gameReset" }));
    }

    #[test]
    fn test_snapshot_json_uses_camel_case() {
        let value = serde_json::to_value(snapshot(vec![])).unwrap();
        assert_eq!(value["roomKey"], "lobby");
        assert_eq!(value["hostId"], 1);
        assert_eq!(value["phase"], "settled");
        assert_eq!(value["companies"][0]["totalInvestment"], 100);
    }

    #[test]
    fn test_rankings_orders_by_final_value_descending() {
        let snap = snapshot(vec![
            player(1, Some(52_000.0)),
            player(2, Some(78_000.0)),
            player(3, Some(10.0)),
        ]);
        assert_eq!(snap.rankings(), vec![PlayerId(2), PlayerId(1), PlayerId(3)]);
    }

    #[test]
    fn test_rankings_ties_keep_join_order() {
        let snap = snapshot(vec![
            player(5, Some(100.0)),
            player(3, Some(100.0)),
            player(4, None),
        ]);
        assert_eq!(snap.rankings(), vec![PlayerId(5), PlayerId(3), PlayerId(4)]);
    }

    #[test]
    fn test_handshake_resume_token_defaults_to_none() {
        let msg: SystemMessage =
            serde_json::from_value(json!({ "type": "handshake", "version": 1 }))
                .unwrap();
        assert_eq!(
            msg,
            SystemMessage::Handshake {
                version: 1,
                resume_token: None
            }
        );
    }

    #[test]
    fn test_error_message_json_format() {
        let msg = SystemMessage::Error {
            code: 403,
            message: "only the host can do that".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], 403);
    }

    #[test]
    fn test_client_envelope_is_adjacently_tagged() {
        let env: ClientEnvelope = serde_json::from_value(json!({
            "seq": 4,
            "timestamp": 100,
            "payload": {
                "type": "intent",
                "data": { "type": "resetGame", "roomKey": "lobby" }
            }
        }))
        .unwrap();

        assert_eq!(env.seq, 4);
        assert!(matches!(
            env.payload,
            ClientPayload::Intent(ClientIntent::ResetGame { .. })
        ));
    }

    #[test]
    fn test_server_envelope_event_json_format() {
        let env = ServerEnvelope {
            seq: 1,
            timestamp: 0,
            payload: ServerPayload::Event(ServerEvent::InvestmentStarted),
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["payload"]["type"], "event");
        assert_eq!(value["payload"]["data"]["type"], "investmentStarted");
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<ClientEnvelope, _> =
            serde_json::from_slice(b"not json at all");
        assert!(result.is_err());
    }
}
