//! Gateway error types.

use domain::DomainError;
use session::SessionError;
use storage::StorageError;
use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Domain rule violation; surfaced verbatim to the caller.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage-layer failure (cache, lock, or durable store).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Session issue or validation failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope named an action that has no handler.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The envelope data did not decode into the action's request type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Unknown username or wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Missing or unacceptable session token.
    #[error("unauthorized")]
    Unauthorized,

    /// The per-request timeout elapsed before the service call finished.
    #[error("request timed out")]
    Timeout,

    /// The connection's outbound channel is gone.
    #[error("channel send error")]
    ChannelSend,
}

impl GatewayError {
    /// The message sent to the caller.
    ///
    /// Domain rules, validation failures, and lock contention are
    /// authoritative reasons the caller may act on; infrastructure details
    /// are collapsed to a generic message (the cause is logged separately).
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Domain(err) => err.to_string(),
            GatewayError::Storage(err) => match err {
                StorageError::LockNotAcquired(_)
                | StorageError::ClientNotFound(_)
                | StorageError::WalletNotFound(_)
                | StorageError::MatchNotFound(_)
                | StorageError::UsernameTaken(_) => err.to_string(),
                StorageError::Redis(_)
                | StorageError::Database(_)
                | StorageError::Json(_)
                | StorageError::Domain(_) => "internal error".to_string(),
            },
            GatewayError::Session(_) | GatewayError::Unauthorized => "unauthorized".to_string(),
            GatewayError::ChannelSend => "internal error".to_string(),
            GatewayError::Json(_)
            | GatewayError::InvalidAction(_)
            | GatewayError::InvalidPayload(_)
            | GatewayError::InvalidCredentials
            | GatewayError::Timeout => self.to_string(),
        }
    }

    /// Whether the underlying cause should be logged at error level rather
    /// than reported as the caller's fault.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GatewayError::Storage(
                StorageError::Redis(_)
                    | StorageError::Database(_)
                    | StorageError::Json(_)
                    | StorageError::Domain(_)
            ) | GatewayError::ChannelSend
        )
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
