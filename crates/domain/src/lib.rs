//! Domain model for the parity-betting game.
//!
//! This crate holds the entities and their legal transitions:
//! - `Client`: registered identity with a bcrypt-hashed password
//! - `Wallet`: the client's balance, mutated only by credit/debit
//! - `Player`: cached projection of client + wallet used for game gating
//! - `Match`: the match lifecycle state machine (waiting → playing → ended,
//!   or waiting → finished against the computer opponent)
//!
//! Everything here is synchronous and storage-agnostic; persistence and
//! caching live in the `storage` crate.

pub mod client;
pub mod error;
pub mod game;
pub mod player;
pub mod wallet;

pub use client::Client;
pub use error::{DomainError, Result};
pub use game::{
    GameMode, Match, MatchPlayer, MatchStatus, Parity, PlayerRole, COMPUTER_PLAYER, MAX_DRAW,
};
pub use player::Player;
pub use wallet::Wallet;
