//! Key-value store abstraction over the cache tier.
//!
//! [`RedisStore`] is the production implementation; [`MemoryStore`] is its
//! in-process twin for tests and single-node development. Both implement the
//! same trait, so the lock and cache-aside layers never know which one they
//! are running against.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Async key-value operations the cache tier must provide.
///
/// `set_nx` and `delete_if_equals` must be atomic: they are the substrate
/// the distributed lock builds mutual exclusion on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Store a value only if the key is absent, with a TTL. Returns whether
    /// the write won.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Whether the key currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the key unconditionally.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete the key only if its current value equals `expected`, as one
    /// atomic check-and-delete. Returns whether a deletion happened.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Keys matching a `prefix*` pattern (or an exact key).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Lua check-and-delete used for owner-verified lock release. GET and DEL
/// must happen in one script so no other owner can slip in between them.
const CHECK_AND_DELETE: &str =
    r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("del", KEYS[1]) else return 0 end"#;

/// Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisStore {
    client: Arc<redis::Client>,
    check_and_delete: Arc<redis::Script>,
}

impl RedisStore {
    /// Create a store from a Redis URL. Connections are established lazily
    /// per operation through the multiplexed pool.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
            check_and_delete: Arc::new(redis::Script::new(CHECK_AND_DELETE)),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                conn.pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64)
                    .await?
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        // SET NX PX in one command so acquisition and expiry are atomic.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = self
            .check_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory key-value store with lazy expiry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live key, if it has one. Test introspection for
    /// sliding-expiry behavior.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn expires_at(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // The dashmap entry guard holds the shard lock, making the
        // check-and-insert atomic.
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry {
                        value: value.to_string(),
                        expires_at: Self::expires_at(Some(ttl)),
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: value.to_string(),
                    expires_at: Self::expires_at(Some(ttl)),
                });
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == expected);
        Ok(removed.is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matches = match pattern.strip_suffix('*') {
            Some(prefix) => self
                .entries
                .iter()
                .filter(|entry| !entry.value().is_expired() && entry.key().starts_with(prefix))
                .map(|entry| entry.key().clone())
                .collect(),
            None => {
                if self.exists(pattern).await? {
                    vec![pattern.to_string()]
                } else {
                    Vec::new()
                }
            }
        };
        Ok(matches)
    }
}
