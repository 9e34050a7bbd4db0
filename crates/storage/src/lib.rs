//! Lock-guarded cache-aside storage for the parity-betting backend.
//!
//! Layering, leaves first:
//! - [`cache`]: the `KeyValueStore` trait with Redis and in-memory backends
//! - [`lock`]: distributed mutual exclusion over the key-value store
//! - [`cache_aside`]: generic read-through/write-through access per entity
//! - [`database`]: the durable store (Postgres, with an in-memory twin)
//! - [`repository`]: per-entity repositories composing all of the above
//!
//! The durable store is authoritative; the cache may lag it until the next
//! invalidate-and-reload. All cache population and write-through for a key
//! runs under `lock:<key>`, so exactly one writer is active per key.

pub mod cache;
pub mod cache_aside;
pub mod database;
pub mod error;
pub mod lock;
pub mod repository;

pub use cache::{KeyValueStore, MemoryStore, RedisStore};
pub use cache_aside::CacheAside;
pub use database::{Database, MemoryDatabase, PostgresDatabase};
pub use error::{Result, StorageError};
pub use lock::{DistributedLock, LockConfig, LockGuard};
pub use repository::{
    ClientRepository, MatchRepository, PlayerRepository, WalletRepository, CLIENT_KEY_PREFIX,
    MATCH_KEY_PREFIX, PLAYER_KEY_PREFIX, WALLET_KEY_PREFIX,
};
