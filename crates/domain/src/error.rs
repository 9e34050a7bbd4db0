//! Domain rule violations.

use thiserror::Error;

/// Domain error type.
///
/// Every variant is a rule violation the caller can hear about verbatim;
/// none of these indicate an infrastructure problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Player is already a member of the match.
    #[error("player already in match")]
    PlayerAlreadyInMatch,

    /// Match already has the maximum number of players.
    #[error("match is full")]
    MatchFull,

    /// Match is no longer accepting players.
    #[error("match is not joinable")]
    MatchNotJoinable,

    /// Match can only be left while it is waiting.
    #[error("match is not leavable")]
    MatchNotLeavable,

    /// Not enough players to start the match.
    #[error("match has fewer players than the minimum")]
    MatchMinPlayers,

    /// Too many players to start the match.
    #[error("match has more players than the maximum")]
    MatchMaxPlayers,

    /// Wallet balance does not cover the requested amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// A stored or presented string is not a legal enum value.
    #[error("invalid {0}: {1}")]
    InvalidValue(&'static str, String),

    /// Password hashing or verification failed.
    #[error("password hash error: {0}")]
    PasswordHash(String),
}

impl From<bcrypt::BcryptError> for DomainError {
    fn from(err: bcrypt::BcryptError) -> Self {
        DomainError::PasswordHash(err.to_string())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
