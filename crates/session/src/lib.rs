//! Session issuing and validation.
//!
//! A session is an HS256 JWT plus a mirrored record in the key-value store.
//! The token alone is not enough: validation also checks the mirrored record
//! (so revocation works) and the recorded IP/user-agent (so a stolen token
//! replayed from a different origin is rejected).

pub mod error;
pub mod manager;

pub use error::{Result, SessionError};
pub use manager::{Session, SessionManager, DEFAULT_SESSION_TTL, SESSION_KEY_PREFIX};
