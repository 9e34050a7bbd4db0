//! Storage error types.

use thiserror::Error;
use uuid::Uuid;

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Cache-store (Redis) error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Durable-store error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value failed domain-level validation on rehydration.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// Lock could not be acquired within the retry budget. Transient;
    /// callers may resubmit.
    #[error("lock not acquired: {0}")]
    LockNotAcquired(String),

    /// Client not found (by id or username).
    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// Wallet not found for the client.
    #[error("wallet not found for client {0}")]
    WalletNotFound(Uuid),

    /// Match not found.
    #[error("match not found: {0}")]
    MatchNotFound(Uuid),

    /// Username is already registered.
    #[error("username already taken: {0}")]
    UsernameTaken(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
