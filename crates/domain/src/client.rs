//! Registered client identity.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered client. Owns exactly one wallet (1:1, by `client_id` on the
/// wallet side). The password is only ever held as a bcrypt hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    id: Uuid,
    username: String,
    password_hash: String,
}

impl Client {
    /// Register a new client, hashing the password.
    pub fn new(username: impl Into<String>, password: &str) -> Result<Self> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash,
        })
    }

    /// Rehydrate a client from stored state.
    pub fn load(id: Uuid, username: String, password_hash: String) -> Self {
        Self {
            id,
            username,
            password_hash,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Check a presented password against the stored hash.
    pub fn verify_password(&self, password: &str) -> Result<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }
}
