//! WebSocket protocol envelopes and action payloads.
//!
//! Every inbound frame is an `{action, data}` envelope; every reply is an
//! `{action, data, error?}` envelope on the same connection. Actions form a
//! closed set: the [`Action`] enum is the dispatch table, so a request type
//! without a handler cannot exist.

use chrono::{DateTime, Utc};
use domain::{GameMode, Match, MatchPlayer, MatchStatus, Parity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Inbound request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outbound reply envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub action: String,
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Success reply on the action's reply name.
    pub fn ok(action: &str, data: serde_json::Value) -> Self {
        Self {
            action: action.to_string(),
            data: Some(data),
            error: None,
        }
    }

    /// Failure reply; all failures share the `error` action name.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            action: "error".to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// The closed set of recognized actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateMatch,
    JoinMatch,
    LeaveMatch,
    PlaceBet,
    GetMatch,
    StartMatch,
    EndMatch,
}

impl Action {
    /// Parse a request action name; `None` means no handler exists.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create_match" => Some(Action::CreateMatch),
            "join_match" => Some(Action::JoinMatch),
            "leave_match" => Some(Action::LeaveMatch),
            "place_bet" => Some(Action::PlaceBet),
            "get_match" => Some(Action::GetMatch),
            "start_match" => Some(Action::StartMatch),
            "end_match" => Some(Action::EndMatch),
            _ => None,
        }
    }

    pub fn request_name(self) -> &'static str {
        match self {
            Action::CreateMatch => "create_match",
            Action::JoinMatch => "join_match",
            Action::LeaveMatch => "leave_match",
            Action::PlaceBet => "place_bet",
            Action::GetMatch => "get_match",
            Action::StartMatch => "start_match",
            Action::EndMatch => "end_match",
        }
    }

    /// The action name carried by the success reply.
    pub fn reply_name(self) -> &'static str {
        match self {
            Action::CreateMatch => "match_created",
            Action::JoinMatch => "match_joined",
            Action::LeaveMatch => "match_left",
            Action::PlaceBet => "bet_placed",
            Action::GetMatch => "get_match",
            Action::StartMatch => "match_started",
            Action::EndMatch => "match_ended",
        }
    }
}

/// `create_match` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMatchRequest {
    pub min_players: usize,
    pub max_players: usize,
    pub game_mode: GameMode,
}

/// Payload for the actions addressing an existing match.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchIdRequest {
    pub match_id: Uuid,
}

/// `place_bet` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetRequest {
    pub match_id: Uuid,
    pub amount: f64,
    pub parity: Parity,
}

/// Match state as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub status: MatchStatus,
    pub game_mode: GameMode,
    pub min_players: usize,
    pub max_players: usize,
    pub players: Vec<MatchPlayer>,
    pub choices: HashMap<String, Parity>,
    pub bets: HashMap<String, f64>,
    pub result: Option<Parity>,
    pub current_turn: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Match> for MatchView {
    fn from(game: &Match) -> Self {
        Self {
            id: game.id(),
            creator_id: game.creator_id(),
            status: game.status(),
            game_mode: game.game_mode(),
            min_players: game.min_players(),
            max_players: game.max_players(),
            players: game.players().to_vec(),
            choices: game.choices().clone(),
            bets: game.bets().clone(),
            result: game.result(),
            current_turn: game.current_turn().map(str::to_string),
            created_at: game.created_at(),
        }
    }
}
