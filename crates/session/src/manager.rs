//! JWT-backed session manager with a mirrored store record.

use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storage::KeyValueStore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for mirrored session records. Keys are client-prefixed
/// (`session:<client_id>:<token>`) so per-client revocation enumerates one
/// client's keys instead of scanning every session.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Fixed token TTL; sliding on each successful validation.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const ISSUER: &str = "game-api";

/// Signed token claims.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    ip: String,
    user_agent: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// Mirrored session record, stored beside the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub client_id: Uuid,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Issues, validates, and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, jwt_secret: &str, ttl: Duration) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
            ttl,
        }
    }

    fn session_key(client_id: Uuid, token: &str) -> String {
        format!("{}{}:{}", SESSION_KEY_PREFIX, client_id, token)
    }

    fn client_pattern(client_id: Uuid) -> String {
        format!("{}{}:*", SESSION_KEY_PREFIX, client_id)
    }

    /// Mint a token bound to the client, origin IP, and user agent, and
    /// persist the mirrored record with the same TTL.
    pub async fn create(&self, client_id: Uuid, ip: &str, user_agent: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: client_id.to_string(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;

        let session = Session {
            client_id,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            last_activity: now,
        };
        self.store
            .set(
                &Self::session_key(client_id, &token),
                &serde_json::to_string(&session)?,
                Some(self.ttl),
            )
            .await?;
        debug!("created session for client {}", client_id);
        Ok(token)
    }

    /// Verify the token and the mirrored record, and check the presented
    /// IP/user-agent against the values recorded at creation. Success slides
    /// the record's TTL; any failure leaves it untouched.
    pub async fn validate(&self, token: &str, ip: &str, user_agent: &str) -> Result<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        let client_id =
            Uuid::parse_str(&data.claims.sub).map_err(|_| SessionError::MalformedSubject)?;

        let key = Self::session_key(client_id, token);
        let raw = self.store.get(&key).await?.ok_or(SessionError::Revoked)?;
        let mut session: Session = serde_json::from_str(&raw)?;

        if session.ip != ip {
            warn!(
                "session IP mismatch for client {}: recorded {}, presented {}",
                client_id, session.ip, ip
            );
            return Err(SessionError::IpMismatch);
        }
        if session.user_agent != user_agent {
            warn!(
                "session user agent mismatch for client {}: recorded {:?}, presented {:?}",
                client_id, session.user_agent, user_agent
            );
            return Err(SessionError::UserAgentMismatch);
        }

        session.last_activity = Utc::now();
        self.store
            .set(&key, &serde_json::to_string(&session)?, Some(self.ttl))
            .await?;
        Ok(client_id)
    }

    /// Revoke one session.
    pub async fn delete(&self, client_id: Uuid, token: &str) -> Result<()> {
        self.store
            .delete(&Self::session_key(client_id, token))
            .await?;
        debug!("deleted session for client {}", client_id);
        Ok(())
    }

    /// Revoke every session of one client.
    pub async fn delete_all_for_client(&self, client_id: Uuid) -> Result<()> {
        let keys = self.store.keys(&Self::client_pattern(client_id)).await?;
        let revoked = keys.len();
        for key in keys {
            self.store.delete(&key).await?;
        }
        debug!("revoked {} sessions for client {}", revoked, client_id);
        Ok(())
    }
}
