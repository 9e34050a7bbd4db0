//! Lock-guarded cache-aside access for one entity kind.

use crate::cache::KeyValueStore;
use crate::error::Result;
use crate::lock::{DistributedLock, LOCK_KEY_PREFIX};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Generic cache-aside accessor.
///
/// Reads populate the cache lazily from the durable loader; writes persist
/// first and only then refresh the cache. Reads and writes for a key run
/// under `lock:<key>`, so concurrent loaders collapse to a single durable
/// read and a writer never interleaves with an in-flight population. The
/// durable store stays authoritative: on any anomaly, invalidate and the
/// next read reconverges.
pub struct CacheAside<T> {
    store: Arc<dyn KeyValueStore>,
    lock: DistributedLock,
    prefix: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lock: self.lock.clone(),
            prefix: self.prefix,
            _entity: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> CacheAside<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, lock: DistributedLock, prefix: &'static str) -> Self {
        Self {
            store,
            lock,
            prefix,
            _entity: PhantomData,
        }
    }

    fn cache_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn lock_key(cache_key: &str) -> String {
        format!("{}{}", LOCK_KEY_PREFIX, cache_key)
    }

    /// Return the cached value, or load it from the durable store and
    /// populate the cache. The loader only runs on a miss.
    pub async fn get_or_load<F, Fut>(&self, id: &str, loader: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.cache_key(id);
        self.lock
            .with_lock(&Self::lock_key(&key), || async {
                if let Some(value) = self.read_cache(&key).await? {
                    return Ok(value);
                }
                let value = loader().await?;
                self.write_cache(&key, &value).await?;
                debug!("cache populated for {}", key);
                Ok(value)
            })
            .await
    }

    /// Persist through `persist`, then refresh the cache entry. A failed
    /// persist leaves the previous cache entry untouched.
    pub async fn save<F, Fut>(&self, id: &str, value: &T, persist: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let key = self.cache_key(id);
        self.lock
            .with_lock(&Self::lock_key(&key), || async {
                persist().await?;
                self.write_cache(&key, value).await
            })
            .await
    }

    /// Drop the cache entry so the next read goes back to the durable store.
    pub async fn invalidate(&self, id: &str) -> Result<()> {
        let key = self.cache_key(id);
        debug!("invalidating cache entry {}", key);
        self.store.delete(&key).await
    }

    async fn read_cache(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                // Not a normal miss: a value we wrote no longer decodes.
                warn!(
                    "corrupt cache entry for {}, falling back to durable store: {}",
                    key, err
                );
                Ok(None)
            }
        }
    }

    async fn write_cache(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::error::StorageError;
    use crate::lock::LockConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counters_cache(store: Arc<MemoryStore>) -> CacheAside<u64> {
        let lock = DistributedLock::new(
            store.clone(),
            LockConfig {
                ttl: Duration::from_secs(5),
                max_retries: 50,
                retry_delay: Duration::from_millis(10),
            },
        );
        CacheAside::new(store, lock, "counter:")
    }

    fn forced_failure() -> StorageError {
        serde_json::from_str::<u64>("not a number").unwrap_err().into()
    }

    #[tokio::test]
    async fn test_concurrent_get_or_load_loads_once() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store);
        let loads = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let loads = loads.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_load("7", move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(99)
                    })
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 99);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_then_get_skips_loader() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store);

        cache.save("7", &42, || async { Ok(()) }).await.unwrap();

        let value = cache
            .get_or_load("7", || async { panic!("loader must not run") })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store);
        let loads = Arc::new(AtomicUsize::new(0));

        let loader = |loads: Arc<AtomicUsize>| {
            move || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(5)
            }
        };

        cache.get_or_load("7", loader(loads.clone())).await.unwrap();
        cache.get_or_load("7", loader(loads.clone())).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.invalidate("7").await.unwrap();
        cache.get_or_load("7", loader(loads.clone())).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_falls_back_to_loader() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store.clone());

        store.set("counter:7", "{garbage", None).await.unwrap();

        let value = cache.get_or_load("7", || async { Ok(12) }).await.unwrap();
        assert_eq!(value, 12);

        // The repaired entry now decodes without the loader.
        let value = cache
            .get_or_load("7", || async { panic!("loader must not run") })
            .await
            .unwrap();
        assert_eq!(value, 12);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_untouched() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store);

        cache.save("7", &10, || async { Ok(()) }).await.unwrap();

        let denied = cache
            .save("7", &99, || async { Err(forced_failure()) })
            .await;
        assert!(denied.is_err());

        let value = cache
            .get_or_load("7", || async { panic!("loader must not run") })
            .await
            .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_failing_loader_caches_nothing() {
        let store = Arc::new(MemoryStore::new());
        let cache = counters_cache(store.clone());

        let denied = cache
            .get_or_load("7", || async { Err(forced_failure()) })
            .await;
        assert!(denied.is_err());
        assert!(!store.exists("counter:7").await.unwrap());
        assert!(!store.exists("lock:counter:7").await.unwrap());
    }
}
