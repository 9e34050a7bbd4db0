//! Match lifecycle state machine.
//!
//! A match moves `Waiting → Playing → Ended`, or straight from `Waiting` to
//! `Finished` when a computer-mode bet fills both parities. Membership,
//! betting, and the draw all live here; wallet settlement is orchestrated a
//! layer up so this module stays free of storage concerns.

use crate::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Reserved player key for the synthesized computer opponent.
pub const COMPUTER_PLAYER: &str = "computer";

/// Upper bound (inclusive) of the number draw.
pub const MAX_DRAW: u32 = 100;

/// How opponents are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Single opponent; readiness keys off the designated current turn.
    Player,
    /// Free-for-all; every member must choose before the match is ready.
    All,
    /// Against a synthesized computer opponent.
    Computer,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Player => "player",
            GameMode::All => "all",
            GameMode::Computer => "computer",
        }
    }
}

impl std::str::FromStr for GameMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "player" => Ok(GameMode::Player),
            "all" => Ok(GameMode::All),
            "computer" => Ok(GameMode::Computer),
            other => Err(DomainError::InvalidValue("game mode", other.to_string())),
        }
    }
}

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Playing,
    Ended,
    Finished,
}

impl MatchStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Ended | MatchStatus::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Playing => "playing",
            MatchStatus::Ended => "ended",
            MatchStatus::Finished => "finished",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(MatchStatus::Waiting),
            "playing" => Ok(MatchStatus::Playing),
            "ended" => Ok(MatchStatus::Ended),
            "finished" => Ok(MatchStatus::Finished),
            other => Err(DomainError::InvalidValue("match status", other.to_string())),
        }
    }
}

/// Membership role; the first member is always the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Host,
    Guest,
}

/// A bet on whether the drawn number is even or odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// The opposing choice.
    pub fn opposite(self) -> Parity {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    /// Classify a drawn number.
    pub fn from_number(n: u32) -> Parity {
        if n % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Parity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "even" => Ok(Parity::Even),
            "odd" => Ok(Parity::Odd),
            other => Err(DomainError::InvalidValue("parity", other.to_string())),
        }
    }
}

/// Membership record of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub player_id: Uuid,
    pub role: PlayerRole,
}

/// A parity-betting match.
///
/// The struct exclusively owns its membership, choice, and bet maps; all
/// mutation goes through the methods below. Choices and bets are keyed by
/// the player id string so the reserved [`COMPUTER_PLAYER`] key fits
/// alongside real ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    id: Uuid,
    creator_id: Uuid,
    min_players: usize,
    max_players: usize,
    game_mode: GameMode,
    status: MatchStatus,
    players: Vec<MatchPlayer>,
    choices: HashMap<String, Parity>,
    bets: HashMap<String, f64>,
    result: Option<Parity>,
    current_turn: Option<String>,
    created_at: DateTime<Utc>,
}

impl Match {
    /// Create a fresh match in `Waiting` with no members.
    pub fn new(creator_id: Uuid, min_players: usize, max_players: usize, game_mode: GameMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            min_players,
            max_players,
            game_mode,
            status: MatchStatus::Waiting,
            players: Vec::new(),
            choices: HashMap::new(),
            bets: HashMap::new(),
            result: None,
            current_turn: None,
            created_at: Utc::now(),
        }
    }

    /// Rehydrate a match from stored state.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        id: Uuid,
        creator_id: Uuid,
        min_players: usize,
        max_players: usize,
        game_mode: GameMode,
        status: MatchStatus,
        players: Vec<MatchPlayer>,
        choices: HashMap<String, Parity>,
        bets: HashMap<String, f64>,
        result: Option<Parity>,
        current_turn: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creator_id,
            min_players,
            max_players,
            game_mode,
            status,
            players,
            choices,
            bets,
            result,
            current_turn,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn creator_id(&self) -> Uuid {
        self.creator_id
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn players(&self) -> &[MatchPlayer] {
        &self.players
    }

    pub fn choices(&self) -> &HashMap<String, Parity> {
        &self.choices
    }

    pub fn bets(&self) -> &HashMap<String, f64> {
        &self.bets
    }

    pub fn result(&self) -> Option<Parity> {
        self.result
    }

    pub fn current_turn(&self) -> Option<&str> {
        self.current_turn.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_member(&self, player_id: Uuid) -> bool {
        self.players.iter().any(|p| p.player_id == player_id)
    }

    /// Designate whose turn gates readiness in [`GameMode::Player`].
    pub fn set_current_turn(&mut self, player_id: Option<String>) {
        self.current_turn = player_id;
    }

    /// Add a member. The first joiner becomes host, everyone after guest.
    pub fn add_player(&mut self, player_id: Uuid) -> Result<()> {
        if self.is_member(player_id) {
            return Err(DomainError::PlayerAlreadyInMatch);
        }
        if self.players.len() >= self.max_players {
            return Err(DomainError::MatchFull);
        }
        if self.status != MatchStatus::Waiting {
            return Err(DomainError::MatchNotJoinable);
        }
        let role = if self.players.is_empty() {
            PlayerRole::Host
        } else {
            PlayerRole::Guest
        };
        self.players.push(MatchPlayer { player_id, role });
        Ok(())
    }

    /// Remove a member, promoting the first remaining member to host if the
    /// host left. Removing from an empty match (or a non-member) is a no-op.
    pub fn remove_player(&mut self, player_id: Uuid) -> Result<()> {
        if self.status != MatchStatus::Waiting {
            return Err(DomainError::MatchNotLeavable);
        }
        let Some(idx) = self.players.iter().position(|p| p.player_id == player_id) else {
            return Ok(());
        };
        let removed = self.players.remove(idx);
        if removed.role == PlayerRole::Host {
            if let Some(first) = self.players.first_mut() {
                first.role = PlayerRole::Host;
            }
        }
        Ok(())
    }

    /// Record a bet: the amount accumulates across calls, the choice is
    /// overwritten by the latest call. In computer mode the first recorded
    /// choice synthesizes the opposing computer choice and finishes the
    /// match immediately.
    pub fn place_bet(&mut self, player_id: &str, amount: f64, parity: Parity) {
        *self.bets.entry(player_id.to_string()).or_insert(0.0) += amount;
        self.choices.insert(player_id.to_string(), parity);

        if self.game_mode == GameMode::Computer && self.choices.len() == 1 {
            self.choices
                .insert(COMPUTER_PLAYER.to_string(), parity.opposite());
            self.status = MatchStatus::Finished;
        }
    }

    /// Start the match.
    pub fn play(&mut self) -> Result<()> {
        if self.players.len() < self.min_players {
            return Err(DomainError::MatchMinPlayers);
        }
        if self.players.len() > self.max_players {
            return Err(DomainError::MatchMaxPlayers);
        }
        self.status = MatchStatus::Playing;
        Ok(())
    }

    /// End the match. Terminal-state protection is the caller's job: the
    /// match service skips this for matches that already finished.
    pub fn end(&mut self) {
        self.status = MatchStatus::Ended;
    }

    /// Draw the result if it has not been drawn yet and return it.
    ///
    /// Idempotent per match instance: once set, the result is never redrawn.
    pub fn resolve(&mut self) -> Parity {
        if let Some(result) = self.result {
            return result;
        }
        let n = rand::thread_rng().gen_range(0..=MAX_DRAW);
        let result = Parity::from_number(n);
        self.result = Some(result);
        result
    }

    /// Bets whose recorded choice equals the drawn result. Empty until
    /// [`Match::resolve`] has run.
    pub fn winners(&self) -> HashMap<String, f64> {
        let Some(result) = self.result else {
            return HashMap::new();
        };
        self.bets
            .iter()
            .filter(|(id, _)| self.choices.get(*id) == Some(&result))
            .map(|(id, amount)| (id.clone(), *amount))
            .collect()
    }

    /// Readiness predicate: have all relevant parties chosen?
    pub fn both_players_chose(&self) -> bool {
        match self.game_mode {
            GameMode::Computer => self.choices.len() == 2,
            GameMode::Player => match &self.current_turn {
                Some(turn) => self.choices.contains_key(turn),
                None => false,
            },
            GameMode::All => self
                .players
                .iter()
                .all(|p| self.choices.contains_key(&p.player_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_match() -> Match {
        Match::new(Uuid::new_v4(), 2, 2, GameMode::Player)
    }

    #[test]
    fn test_first_joiner_is_host_rest_guests() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();

        assert_eq!(m.players()[0].player_id, a);
        assert_eq!(m.players()[0].role, PlayerRole::Host);
        assert_eq!(m.players()[1].role, PlayerRole::Guest);
    }

    #[test]
    fn test_add_player_rejects_duplicate() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        m.add_player(a).unwrap();
        assert_eq!(m.add_player(a), Err(DomainError::PlayerAlreadyInMatch));
    }

    #[test]
    fn test_add_player_rejects_when_full() {
        let mut m = two_player_match();
        m.add_player(Uuid::new_v4()).unwrap();
        m.add_player(Uuid::new_v4()).unwrap();
        assert_eq!(m.add_player(Uuid::new_v4()), Err(DomainError::MatchFull));
        assert!(m.players().len() <= m.max_players());
    }

    #[test]
    fn test_add_player_rejects_after_start() {
        let mut m = Match::new(Uuid::new_v4(), 1, 3, GameMode::All);
        m.add_player(Uuid::new_v4()).unwrap();
        m.play().unwrap();
        assert_eq!(
            m.add_player(Uuid::new_v4()),
            Err(DomainError::MatchNotJoinable)
        );
    }

    #[test]
    fn test_remove_player_promotes_new_host() {
        let mut m = Match::new(Uuid::new_v4(), 2, 3, GameMode::All);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();
        m.add_player(c).unwrap();

        m.remove_player(a).unwrap();

        assert_eq!(m.players()[0].player_id, b);
        assert_eq!(m.players()[0].role, PlayerRole::Host);
        let hosts = m
            .players()
            .iter()
            .filter(|p| p.role == PlayerRole::Host)
            .count();
        assert_eq!(hosts, 1);
    }

    #[test]
    fn test_remove_guest_keeps_host() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();

        m.remove_player(b).unwrap();

        assert_eq!(m.players()[0].player_id, a);
        assert_eq!(m.players()[0].role, PlayerRole::Host);
    }

    #[test]
    fn test_remove_from_empty_match_is_noop() {
        let mut m = two_player_match();
        assert!(m.remove_player(Uuid::new_v4()).is_ok());
        assert!(m.players().is_empty());
    }

    #[test]
    fn test_remove_player_rejected_while_playing() {
        let mut m = Match::new(Uuid::new_v4(), 1, 2, GameMode::All);
        let a = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.play().unwrap();
        assert_eq!(m.remove_player(a), Err(DomainError::MatchNotLeavable));
    }

    #[test]
    fn test_membership_invariants_over_churn() {
        let mut m = Match::new(Uuid::new_v4(), 2, 3, GameMode::All);
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().enumerate() {
            let _ = m.add_player(*id);
            if i % 2 == 1 {
                let _ = m.remove_player(ids[i / 2]);
            }
            assert!(m.players().len() <= m.max_players());
            if !m.players().is_empty() {
                let hosts = m
                    .players()
                    .iter()
                    .filter(|p| p.role == PlayerRole::Host)
                    .count();
                assert_eq!(hosts, 1);
            }
        }
    }

    #[test]
    fn test_place_bet_accumulates_amount_and_overwrites_choice() {
        let mut m = two_player_match();
        let a = Uuid::new_v4().to_string();

        m.place_bet(&a, 10.0, Parity::Even);
        m.place_bet(&a, 5.0, Parity::Odd);

        assert_eq!(m.bets()[&a], 15.0);
        assert_eq!(m.choices()[&a], Parity::Odd);
    }

    #[test]
    fn test_computer_mode_synthesizes_opponent_and_finishes() {
        let mut m = Match::new(Uuid::new_v4(), 1, 1, GameMode::Computer);
        let a = Uuid::new_v4();
        m.add_player(a).unwrap();

        m.place_bet(&a.to_string(), 25.0, Parity::Even);

        assert_eq!(m.choices()[COMPUTER_PLAYER], Parity::Odd);
        assert_eq!(m.status(), MatchStatus::Finished);
        assert!(m.both_players_chose());

        // A repeat bet must not re-synthesize or flip the computer choice.
        m.place_bet(&a.to_string(), 5.0, Parity::Odd);
        assert_eq!(m.choices()[COMPUTER_PLAYER], Parity::Odd);
        assert_eq!(m.bets()[&a.to_string()], 30.0);
    }

    #[test]
    fn test_play_requires_min_players() {
        let mut m = two_player_match();
        m.add_player(Uuid::new_v4()).unwrap();
        assert_eq!(m.play(), Err(DomainError::MatchMinPlayers));
        assert_eq!(m.status(), MatchStatus::Waiting);
    }

    #[test]
    fn test_play_rejects_over_capacity_state() {
        let players: Vec<MatchPlayer> = (0..3)
            .map(|i| MatchPlayer {
                player_id: Uuid::new_v4(),
                role: if i == 0 {
                    PlayerRole::Host
                } else {
                    PlayerRole::Guest
                },
            })
            .collect();
        let mut m = Match::load(
            Uuid::new_v4(),
            players[0].player_id,
            1,
            2,
            GameMode::All,
            MatchStatus::Waiting,
            players,
            HashMap::new(),
            HashMap::new(),
            None,
            None,
            Utc::now(),
        );
        assert_eq!(m.play(), Err(DomainError::MatchMaxPlayers));
    }

    #[test]
    fn test_play_then_end() {
        let mut m = two_player_match();
        m.add_player(Uuid::new_v4()).unwrap();
        m.add_player(Uuid::new_v4()).unwrap();
        m.play().unwrap();
        assert_eq!(m.status(), MatchStatus::Playing);
        m.end();
        assert_eq!(m.status(), MatchStatus::Ended);
        assert!(m.status().is_terminal());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut m = two_player_match();
        let first = m.resolve();
        for _ in 0..20 {
            assert_eq!(m.resolve(), first);
        }
        assert_eq!(m.result(), Some(first));
    }

    #[test]
    fn test_winners_follow_result() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();
        m.place_bet(&a.to_string(), 10.0, Parity::Even);
        m.place_bet(&b.to_string(), 10.0, Parity::Odd);

        assert!(m.winners().is_empty());

        let result = m.resolve();
        let winners = m.winners();
        let expected = if result == Parity::Even { a } else { b };

        assert_eq!(winners.len(), 1);
        assert_eq!(winners[&expected.to_string()], 10.0);
    }

    #[test]
    fn test_both_players_chose_all_mode() {
        let mut m = Match::new(Uuid::new_v4(), 2, 2, GameMode::All);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();

        m.place_bet(&a.to_string(), 1.0, Parity::Even);
        assert!(!m.both_players_chose());

        m.place_bet(&b.to_string(), 1.0, Parity::Odd);
        assert!(m.both_players_chose());
    }

    #[test]
    fn test_both_players_chose_turn_mode() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.add_player(b).unwrap();

        assert!(!m.both_players_chose());

        m.set_current_turn(Some(b.to_string()));
        m.place_bet(&a.to_string(), 1.0, Parity::Even);
        assert!(!m.both_players_chose());

        m.place_bet(&b.to_string(), 1.0, Parity::Odd);
        assert!(m.both_players_chose());
    }

    #[test]
    fn test_parity_helpers() {
        assert_eq!(Parity::from_number(42), Parity::Even);
        assert_eq!(Parity::from_number(7), Parity::Odd);
        assert_eq!(Parity::Even.opposite(), Parity::Odd);
        assert_eq!(Parity::Odd.to_string(), "odd");
    }

    #[test]
    fn test_enum_text_round_trips() {
        for mode in [GameMode::Player, GameMode::All, GameMode::Computer] {
            assert_eq!(mode.as_str().parse::<GameMode>().unwrap(), mode);
        }
        for status in [
            MatchStatus::Waiting,
            MatchStatus::Playing,
            MatchStatus::Ended,
            MatchStatus::Finished,
        ] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
        for parity in [Parity::Even, Parity::Odd] {
            assert_eq!(parity.as_str().parse::<Parity>().unwrap(), parity);
        }
        assert!("sideways".parse::<Parity>().is_err());
    }

    #[test]
    fn test_match_survives_serde_round_trip() {
        let mut m = two_player_match();
        let a = Uuid::new_v4();
        m.add_player(a).unwrap();
        m.place_bet(&a.to_string(), 12.5, Parity::Even);

        let json = serde_json::to_string(&m).unwrap();
        let back: Match = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id(), m.id());
        assert_eq!(back.status(), MatchStatus::Waiting);
        assert_eq!(back.bets()[&a.to_string()], 12.5);
        assert_eq!(back.choices()[&a.to_string()], Parity::Even);
    }
}
