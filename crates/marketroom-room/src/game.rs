//! The investment game state machine for a single room.
//!
//! [`GameRoom`] is plain synchronous data: every operation validates first,
//! then mutates, then returns the events to deliver. A rejected operation
//! returns an error and leaves the room exactly as it was. The room actor
//! owns one of these and serialises access to it.

use std::collections::{BTreeMap, HashMap};

use marketroom_protocol::{
    CompanyView, Phase, PlayerId, PlayerView, Recipient, RoomKey, RoomSnapshot, ServerEvent,
};

use crate::settlement::{self, Submission};
use crate::{GameConfig, RoomError};

/// Events produced by one operation, in delivery order.
pub type Outbound = Vec<(Recipient, ServerEvent)>;

#[derive(Debug, Clone)]
struct Player {
    id: PlayerId,
    name: String,
    remaining_money: u64,
    investments: BTreeMap<String, u64>,
    final_value: Option<f64>,
    connected: bool,
}

#[derive(Debug, Clone)]
struct Company {
    name: String,
    total_investment: u64,
    growth: f64,
}

/// One room's authoritative game state.
#[derive(Debug, Clone)]
pub struct GameRoom {
    key: RoomKey,
    config: GameConfig,
    phase: Phase,
    /// Join order.
    players: Vec<Player>,
    /// Insertion order.
    companies: Vec<Company>,
    /// Only populated while investing.
    submissions: HashMap<PlayerId, Submission>,
    host: Option<PlayerId>,
    version: u64,
}

impl GameRoom {
    pub fn new(key: RoomKey, config: GameConfig) -> Self {
        Self {
            key,
            config,
            phase: Phase::Waiting,
            players: Vec::new(),
            companies: Vec::new(),
            submissions: HashMap::new(),
            host: None,
            version: 0,
        }
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == player)
    }

    /// Seated players in join order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Seats a new player with the starting capital. The first player in
    /// an empty room becomes host.
    pub fn join(&mut self, id: PlayerId, display_name: &str) -> Result<Outbound, RoomError> {
        if self.contains(id) {
            return Err(RoomError::AlreadyInRoom(id, self.key.clone()));
        }
        let name = self.checked_name(display_name)?;

        self.players.push(Player {
            id,
            name,
            remaining_money: self.config.starting_capital,
            investments: BTreeMap::new(),
            final_value: None,
            connected: true,
        });
        if self.host.is_none() {
            self.host = Some(id);
        }
        self.version += 1;

        tracing::info!(
            room_key = %self.key,
            player_id = %id,
            players = self.players.len(),
            "player joined"
        );

        let mut events = Vec::new();
        if let Some(player) = self.players.last() {
            events.push((
                Recipient::AllExcept(id),
                ServerEvent::PlayerJoined {
                    player: self.view(player),
                    player_count: self.players.len(),
                },
            ));
        }
        Ok(self.finish(events))
    }

    /// Appends a company. Host only, while waiting or investing.
    pub fn add_company(&mut self, by: PlayerId, name: &str) -> Result<Outbound, RoomError> {
        self.require_host(by, "add a company")?;
        if self.phase == Phase::Settled {
            return Err(RoomError::InvalidPhase {
                action: "add a company",
                phase: self.phase,
            });
        }
        let name = self.checked_name(name)?;
        if self.companies.iter().any(|c| c.name == name) {
            return Err(RoomError::DuplicateEntity(name));
        }

        let company = Company {
            name,
            total_investment: 0,
            growth: 0.0,
        };
        let added = company_view(&company);
        self.companies.push(company);
        self.version += 1;

        tracing::info!(room_key = %self.key, company = %added.name, "company added");

        let event = ServerEvent::CompanyAdded {
            company: added,
            company_count: self.companies.len(),
        };
        Ok(self.finish(vec![(Recipient::All, event)]))
    }

    /// Removes a company. Host only, while waiting.
    pub fn delete_company(&mut self, by: PlayerId, name: &str) -> Result<Outbound, RoomError> {
        self.require_host(by, "delete a company")?;
        self.require_phase(Phase::Waiting, "delete a company")?;
        let name = name.trim();
        let index = self
            .companies
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| RoomError::UnknownEntity(name.to_string()))?;

        let removed = self.companies.remove(index);
        self.version += 1;

        tracing::info!(room_key = %self.key, company = %removed.name, "company deleted");

        let event = ServerEvent::CompanyDeleted {
            name: removed.name,
            company_count: self.companies.len(),
        };
        Ok(self.finish(vec![(Recipient::All, event)]))
    }

    /// Opens a round. Host only, while waiting.
    pub fn start_round(&mut self, by: PlayerId) -> Result<Outbound, RoomError> {
        self.require_host(by, "start a round")?;
        self.require_phase(Phase::Waiting, "start a round")?;

        self.phase = Phase::Investing;
        self.submissions.clear();
        self.version += 1;

        tracing::info!(
            room_key = %self.key,
            players = self.players.len(),
            companies = self.companies.len(),
            "round started"
        );

        Ok(self.finish(vec![(Recipient::All, ServerEvent::InvestmentStarted)]))
    }

    /// Records a player's investments for the current round, replacing any
    /// earlier submission. Settles the round once every seated player has
    /// submitted.
    ///
    /// Names are trimmed like company names. Names that aren't companies in
    /// this room are dropped and negative amounts count as zero before the
    /// budget check.
    pub fn submit(
        &mut self,
        by: PlayerId,
        investments: &BTreeMap<String, i64>,
    ) -> Result<Outbound, RoomError> {
        let available = self.player(by)?.remaining_money;
        self.require_phase(Phase::Investing, "submit investments")?;

        let mut submission = Submission::new();
        for (name, amount) in investments {
            let name = name.trim();
            if !self.companies.iter().any(|c| c.name == name) {
                continue;
            }
            let amount = u64::try_from(*amount).unwrap_or(0);
            let slot = submission.entry(name.to_string()).or_insert(0);
            *slot = slot.saturating_add(amount);
        }
        let requested: u128 = submission.values().map(|a| u128::from(*a)).sum();
        if requested > u128::from(available) {
            return Err(RoomError::OverBudget {
                requested: u64::try_from(requested).unwrap_or(u64::MAX),
                available,
            });
        }

        let resubmitted = self.submissions.insert(by, submission).is_some();
        self.version += 1;

        tracing::debug!(
            room_key = %self.key,
            player_id = %by,
            resubmitted,
            submitted = self.submissions.len(),
            players = self.players.len(),
            "investments submitted"
        );

        let events = vec![(Recipient::All, ServerEvent::PlayerSubmitted { player_id: by })];
        Ok(self.finish(events))
    }

    /// Removes another player. Host only, any phase.
    pub fn kick(&mut self, by: PlayerId, target: PlayerId) -> Result<Outbound, RoomError> {
        self.require_host(by, "kick a player")?;
        if target == by {
            return Err(RoomError::CannotKickHost);
        }
        if !self.contains(target) {
            return Err(RoomError::UnknownPlayer(target));
        }

        self.remove_player(target);
        self.version += 1;

        tracing::info!(
            room_key = %self.key,
            player_id = %target,
            players = self.players.len(),
            "player kicked"
        );

        let events = vec![
            (
                Recipient::Player(target),
                ServerEvent::KickedFromGame {
                    room_key: self.key.clone(),
                },
            ),
            (
                Recipient::All,
                ServerEvent::PlayerKicked { player_id: target },
            ),
        ];
        Ok(self.finish(events))
    }

    /// Removes a player who left or whose reconnection window ran out.
    ///
    /// If the host leaves, the earliest-joined remaining player takes over.
    /// Leaving the room empty produces no events.
    pub fn leave(&mut self, id: PlayerId) -> Result<Outbound, RoomError> {
        if !self.contains(id) {
            return Err(RoomError::UnknownPlayer(id));
        }

        self.remove_player(id);
        self.version += 1;

        tracing::info!(
            room_key = %self.key,
            player_id = %id,
            players = self.players.len(),
            "player left"
        );

        if self.players.is_empty() {
            self.host = None;
            return Ok(Vec::new());
        }

        let mut events = vec![(
            Recipient::All,
            ServerEvent::PlayerLeft {
                player_id: id,
                player_count: self.players.len(),
            },
        )];
        if self.host == Some(id) {
            let successor = self.players[0].id;
            self.host = Some(successor);
            tracing::info!(room_key = %self.key, host_id = %successor, "host reassigned");
            events.push((
                Recipient::All,
                ServerEvent::HostChanged { host_id: successor },
            ));
        }
        Ok(self.finish(events))
    }

    /// Flags a player as connected or inside the reconnection window.
    /// Setting the flag it already has is a no-op with no events.
    pub fn set_connected(&mut self, id: PlayerId, connected: bool) -> Result<Outbound, RoomError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RoomError::UnknownPlayer(id))?;
        if player.connected == connected {
            return Ok(Vec::new());
        }

        player.connected = connected;
        self.version += 1;

        let event = ServerEvent::PlayerConnection {
            player_id: id,
            connected,
        };
        Ok(self.finish(vec![(Recipient::All, event)]))
    }

    /// Back to waiting: companies and submissions cleared, every player's
    /// money restored. Host only, any phase.
    pub fn reset(&mut self, by: PlayerId) -> Result<Outbound, RoomError> {
        self.require_host(by, "reset the game")?;

        self.phase = Phase::Waiting;
        self.companies.clear();
        self.submissions.clear();
        for player in &mut self.players {
            player.remaining_money = self.config.starting_capital;
            player.investments.clear();
            player.final_value = None;
        }
        self.version += 1;

        tracing::info!(room_key = %self.key, "game reset");

        Ok(self.finish(vec![(Recipient::All, ServerEvent::GameReset)]))
    }

    /// A private snapshot for one player. Changes nothing.
    pub fn request_state(&self, by: PlayerId) -> Result<Outbound, RoomError> {
        self.player(by)?;
        Ok(vec![(
            Recipient::Player(by),
            ServerEvent::GameState {
                snapshot: self.snapshot(),
            },
        )])
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_key: self.key.clone(),
            version: self.version,
            phase: self.phase,
            host_id: self.host,
            players: self.players.iter().map(|p| self.view(p)).collect(),
            companies: self.companies.iter().map(company_view).collect(),
        }
    }

    // -- internals ----------------------------------------------------------

    fn player(&self, id: PlayerId) -> Result<&Player, RoomError> {
        self.players
            .iter()
            .find(|p| p.id == id)
            .ok_or(RoomError::UnknownPlayer(id))
    }

    fn require_host(&self, by: PlayerId, action: &'static str) -> Result<(), RoomError> {
        self.player(by)?;
        if self.host != Some(by) {
            return Err(RoomError::Unauthorized { player: by, action });
        }
        Ok(())
    }

    fn require_phase(&self, phase: Phase, action: &'static str) -> Result<(), RoomError> {
        if self.phase != phase {
            return Err(RoomError::InvalidPhase {
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn checked_name(&self, raw: &str) -> Result<String, RoomError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidName("name must not be empty".into()));
        }
        if name.chars().count() > self.config.max_name_len {
            return Err(RoomError::InvalidName(format!(
                "name is longer than {} characters",
                self.config.max_name_len
            )));
        }
        Ok(name.to_string())
    }

    fn remove_player(&mut self, id: PlayerId) {
        self.players.retain(|p| p.id != id);
        self.submissions.remove(&id);
    }

    /// Settles if the round is open and nobody is still pending, then
    /// appends the snapshot every accepted operation ends with.
    fn finish(&mut self, mut events: Outbound) -> Outbound {
        if self.round_complete() {
            self.settle();
            let snapshot = self.snapshot();
            let rankings = snapshot.rankings();
            events.push((
                Recipient::All,
                ServerEvent::AllPlayersSubmitted { snapshot, rankings },
            ));
        }
        events.push((
            Recipient::All,
            ServerEvent::GameState {
                snapshot: self.snapshot(),
            },
        ));
        events
    }

    fn round_complete(&self) -> bool {
        self.phase == Phase::Investing
            && !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|p| self.submissions.contains_key(&p.id))
    }

    fn settle(&mut self) {
        let names: Vec<String> = self.companies.iter().map(|c| c.name.clone()).collect();
        let outcome = settlement::settle(&names, &self.submissions, self.config.max_growth);

        for (company, settled) in self.companies.iter_mut().zip(&outcome.companies) {
            company.total_investment = settled.total_investment;
            company.growth = settled.growth;
        }
        for player in &mut self.players {
            let submission = self.submissions.remove(&player.id).unwrap_or_default();
            let spent = submission
                .values()
                .fold(0u64, |acc, amount| acc.saturating_add(*amount));
            player.remaining_money = player.remaining_money.saturating_sub(spent);
            player.final_value = Some(
                outcome
                    .final_values
                    .get(&player.id)
                    .copied()
                    .unwrap_or(0.0),
            );
            player.investments = submission;
        }
        self.submissions.clear();
        self.phase = Phase::Settled;

        tracing::info!(
            room_key = %self.key,
            grand_total = outcome.grand_total,
            players = self.players.len(),
            "round settled"
        );
    }

    fn view(&self, player: &Player) -> PlayerView {
        PlayerView {
            id: player.id,
            name: player.name.clone(),
            remaining_money: player.remaining_money,
            investments: player.investments.clone(),
            final_value: player.final_value,
            connected: player.connected,
            submitted: self.submissions.contains_key(&player.id),
        }
    }
}

fn company_view(company: &Company) -> CompanyView {
    CompanyView {
        name: company.name.clone(),
        total_investment: company.total_investment,
        growth: company.growth,
    }
}
