//! Session error types.

use thiserror::Error;

/// Session error type.
///
/// Every variant except `Storage` maps to an unauthorized rejection at the
/// HTTP/WebSocket boundary; the distinctions exist for logging.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token signature or expiry check failed.
    #[error("invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Token claims do not carry a well-formed client id.
    #[error("malformed token subject")]
    MalformedSubject,

    /// Token verified but no mirrored session record exists (revoked or
    /// expired server-side).
    #[error("session revoked or expired")]
    Revoked,

    /// Presented IP differs from the one recorded at creation.
    #[error("session IP mismatch")]
    IpMismatch,

    /// Presented user agent differs from the one recorded at creation.
    #[error("session user agent mismatch")]
    UserAgentMismatch,

    /// Key-value store failure.
    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    /// Mirrored session record failed to serialize or deserialize.
    #[error("session record error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
