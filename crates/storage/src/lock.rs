//! Distributed mutual exclusion over the key-value store.
//!
//! Acquisition is set-if-not-exists with a TTL and a bounded retry loop;
//! release is owner-checked through an atomic check-and-delete so a holder
//! whose TTL lapsed can never delete the next owner's lock. The TTL must
//! exceed the critical-section duration with margin; an expiry mid-section
//! silently admits a second owner.

use crate::cache::KeyValueStore;
use crate::error::{Result, StorageError};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for lock keys derived from cache keys.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Retry policy and TTL for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub ttl: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Proof of ownership for one acquisition; releasing consumes it.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Mutual-exclusion primitive over the shared key-value store.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    config: LockConfig,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Acquire `key` for the configured TTL.
    ///
    /// While the key is held elsewhere, retries up to `max_retries` times
    /// with `retry_delay` between attempts; a key that disappears between
    /// attempts (natural expiry) is retried immediately. Exhausting the
    /// budget fails with [`StorageError::LockNotAcquired`].
    pub async fn acquire(&self, key: &str) -> Result<LockGuard> {
        let token = Uuid::new_v4().to_string();
        for attempt in 0..self.config.max_retries {
            if self.store.set_nx(key, &token, self.config.ttl).await? {
                debug!("acquired lock {} (attempt {})", key, attempt + 1);
                return Ok(LockGuard {
                    key: key.to_string(),
                    token,
                });
            }
            if !self.store.exists(key).await? {
                // Holder's TTL lapsed between attempts; try again now.
                continue;
            }
            tokio::time::sleep(self.config.retry_delay).await;
        }
        warn!(
            "lock {} not acquired after {} attempts",
            key, self.config.max_retries
        );
        Err(StorageError::LockNotAcquired(key.to_string()))
    }

    /// Release an owned lock.
    ///
    /// Deletes only while the stored token still matches the guard; returns
    /// whether a deletion happened. `false` means the TTL already lapsed and
    /// the key is gone or re-owned.
    pub async fn release(&self, guard: LockGuard) -> Result<bool> {
        let deleted = self.store.delete_if_equals(&guard.key, &guard.token).await?;
        if !deleted {
            warn!("lock {} expired or changed owner before release", guard.key);
        }
        Ok(deleted)
    }

    /// Run `f` under the lock, releasing on every exit path. A panic inside
    /// `f` still releases, then resumes unwinding.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.acquire(key).await?;
        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        if let Err(err) = self.release(guard).await {
            warn!("failed to release lock {}: {}", key, err);
        }
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
