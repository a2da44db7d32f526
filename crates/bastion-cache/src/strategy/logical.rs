//! Stale-while-rebuild reads over logically expiring entries.

use super::task::RebuildTask;
use crate::entry::CacheEntry;
use crate::executor::RebuildExecutor;
use crate::keys;
use crate::lock::DistributedLock;
use crate::metrics::{CacheMetrics, Outcome};
use crate::store::CacheStore;
use bastion_core::{BastionResult, CacheId, Loader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const STRATEGY: &str = "logical_expire";

/// Serves cached entries past their logical expiry while one background task
/// refreshes them.
///
/// Entries are expected to be pre-populated (see
/// [`CacheClient::warm_up`](crate::CacheClient::warm_up)); a key that is not
/// in the cache is treated as an entity the cache does not serve and the
/// store is never consulted from the read path.
#[derive(Clone)]
pub struct LogicalExpireStrategy {
    store: Arc<dyn CacheStore>,
    lock: DistributedLock,
    executor: Arc<RebuildExecutor>,
}

impl LogicalExpireStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        lock: DistributedLock,
        executor: Arc<RebuildExecutor>,
    ) -> Self {
        Self {
            store,
            lock,
            executor,
        }
    }

    /// Looks up `key_prefix + id`.
    ///
    /// Never waits on the store or the lock. Errors come only from reading
    /// and decoding the entry; once a payload is in hand it is returned,
    /// fresh or stale.
    pub async fn get<I, V, L>(
        &self,
        key_prefix: &str,
        id: &I,
        loader: &Arc<L>,
        ttl: Duration,
    ) -> BastionResult<Option<V>>
    where
        I: CacheId,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        L: Loader<I, V> + ?Sized + 'static,
    {
        let key = keys::data_key(key_prefix, id);

        let raw = match self.store.get(&key).await? {
            Some(raw) if !keys::is_empty_marker(&raw) => raw,
            _ => {
                CacheMetrics::lookup(STRATEGY, Outcome::Miss);
                return Ok(None);
            }
        };

        let entry = CacheEntry::<V>::decode(&key, &raw)?;
        if !entry.is_expired() {
            CacheMetrics::lookup(STRATEGY, Outcome::Hit);
            return Ok(Some(entry.payload));
        }

        CacheMetrics::lookup(STRATEGY, Outcome::Stale);
        self.schedule_rebuild::<I, V, L>(key, key_prefix, id, loader, ttl)
            .await;
        Ok(Some(entry.payload))
    }

    /// Submits a rebuild if this caller wins the key's lock. Failures are
    /// logged only.
    async fn schedule_rebuild<I, V, L>(
        &self,
        key: String,
        key_prefix: &str,
        id: &I,
        loader: &Arc<L>,
        ttl: Duration,
    ) where
        I: CacheId,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        L: Loader<I, V> + ?Sized + 'static,
    {
        let lock_key = keys::lock_key_for(key_prefix, id);

        let token = match self.lock.try_lock(&lock_key).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(key = %key, "Rebuild already in progress");
                return;
            }
            Err(e) => {
                warn!(key = %key, lock_key = %lock_key, error = %e, "Could not take rebuild lock, serving stale");
                return;
            }
        };

        // A rebuild may have finished between our read and our lock.
        if !self.still_stale::<V>(&key).await {
            if let Err(e) = self.lock.unlock(&token).await {
                warn!(key = %key, lock_key = %lock_key, error = %e, "Failed to release rebuild lock");
            }
            return;
        }

        let task: RebuildTask<I, V, L> = RebuildTask::new(
            id.clone(),
            key.clone(),
            ttl,
            loader.clone(),
            self.store.clone(),
            self.lock.clone(),
            token.clone(),
        );

        if self.executor.submit(Box::new(task)).is_err() {
            // The task was dropped with the lock still held.
            if let Err(e) = self.lock.unlock(&token).await {
                warn!(key = %key, lock_key = %lock_key, error = %e, "Failed to release lock of rejected rebuild");
            }
        }
    }

    /// Whether the entry under `key` still needs a rebuild. A fresh entry
    /// or a failed re-read means it does not.
    async fn still_stale<V: DeserializeOwned>(&self, key: &str) -> bool {
        match self.store.get(key).await {
            Ok(Some(raw)) if !keys::is_empty_marker(&raw) => {
                CacheEntry::<V>::decode(key, &raw).map_or(true, |entry| entry.is_expired())
            }
            Ok(_) => {
                debug!(key = %key, "Entry removed before rebuild");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Could not re-read entry, skipping rebuild");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RebuildExecutorConfig, RebuildOutcome};
    use crate::lock::DEFAULT_LOCK_TTL;
    use crate::store::{MemoryCacheStore, MockCacheStore};
    use bastion_core::{BastionError, FnLoader};
    use chrono::Utc;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Holds the next `get` caller after its read until `release` fires.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryCacheStore,
        gate_next_read: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CacheStore for GatedStore {
        async fn get(&self, key: &str) -> BastionResult<Option<String>> {
            let value = self.inner.get(key).await?;
            if self.gate_next_read.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            Ok(value)
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BastionResult<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> BastionResult<bool> {
            self.inner.delete(key).await
        }

        async fn compare_and_delete(&self, key: &str, expected: &str) -> BastionResult<bool> {
            self.inner.compare_and_delete(key, expected).await
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    const TTL: Duration = Duration::from_secs(20);

    fn shop(name: &str) -> Shop {
        Shop {
            id: 1,
            name: name.to_string(),
        }
    }

    fn strategy_over(store: Arc<MemoryCacheStore>) -> (LogicalExpireStrategy, Arc<RebuildExecutor>) {
        let executor = Arc::new(RebuildExecutor::start(RebuildExecutorConfig::default()));
        let lock = DistributedLock::new(store.clone(), DEFAULT_LOCK_TTL);
        (
            LogicalExpireStrategy::new(store, lock, executor.clone()),
            executor,
        )
    }

    async fn put_entry(store: &MemoryCacheStore, name: &str, expired: bool) {
        let expiry = if expired {
            Utc::now() - chrono::Duration::seconds(1)
        } else {
            Utc::now() + chrono::Duration::seconds(60)
        };
        let raw = CacheEntry::new(shop(name), expiry).encode().unwrap();
        store.set("cache:shop:1", &raw, None).await.unwrap();
    }

    fn renaming_loader(calls: Arc<AtomicUsize>) -> Arc<impl Loader<u64, Shop>> {
        Arc::new(FnLoader::new(move |_id: u64| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Some(shop("New Cafe"))) }
        }))
    }

    #[tokio::test]
    async fn test_absent_key_returns_none_without_load() {
        let (strategy, _executor) = strategy_over(Arc::new(MemoryCacheStore::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<Shop> = strategy
            .get("cache:shop:", &1u64, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap();

        assert!(value.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_returned() {
        let store = Arc::new(MemoryCacheStore::new());
        put_entry(&store, "Cafe", false).await;
        let (strategy, executor) = strategy_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<Shop> = strategy
            .get("cache:shop:", &1u64, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap();

        assert_eq!(value, Some(shop("Cafe")));
        assert_eq!(executor.stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_stale_entry_served_and_rebuilt() {
        let store = Arc::new(MemoryCacheStore::new());
        put_entry(&store, "Cafe", true).await;
        let (strategy, executor) = strategy_over(store.clone());
        let mut events = executor.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = renaming_loader(calls.clone());

        let stale: Option<Shop> = strategy.get("cache:shop:", &1u64, &loader, TTL).await.unwrap();
        assert_eq!(stale, Some(shop("Cafe")));

        let event = events.recv().await.unwrap();
        assert_eq!(event.key, "cache:shop:1");
        assert_eq!(event.outcome, RebuildOutcome::Completed);
        assert!(!store.contains("lock:shop:1"));

        let fresh: Option<Shop> = strategy.get("cache:shop:", &1u64, &loader, TTL).await.unwrap();
        assert_eq!(fresh, Some(shop("New Cafe")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_held_lock_skips_rebuild() {
        let store = Arc::new(MemoryCacheStore::new());
        put_entry(&store, "Cafe", true).await;
        store
            .set_if_absent("lock:shop:1", "someone-else", DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        let (strategy, executor) = strategy_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<Shop> = strategy
            .get("cache:shop:", &1u64, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap();

        assert_eq!(value, Some(shop("Cafe")));
        assert_eq!(executor.stats().submitted, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_rebuild_releases_lock() {
        let store = Arc::new(MemoryCacheStore::new());
        put_entry(&store, "Cafe", true).await;
        let (strategy, executor) = strategy_over(store.clone());
        executor.shutdown().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<Shop> = strategy
            .get("cache:shop:", &1u64, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap();

        assert_eq!(value, Some(shop("Cafe")));
        assert_eq!(executor.stats().rejected, 1);
        assert!(!store.contains("lock:shop:1"));
    }

    #[tokio::test]
    async fn test_lock_failure_still_serves_stale() {
        let raw = CacheEntry::new(shop("Cafe"), Utc::now() - chrono::Duration::seconds(1))
            .encode()
            .unwrap();
        let mut store = MockCacheStore::new();
        store.expect_get().returning(move |_| Ok(Some(raw.clone())));
        store
            .expect_set_if_absent()
            .returning(|_, _, _| Err(BastionError::cache("connection reset")));
        let store: Arc<dyn CacheStore> = Arc::new(store);
        let executor = Arc::new(RebuildExecutor::start(RebuildExecutorConfig::default()));
        let strategy = LogicalExpireStrategy::new(
            store.clone(),
            DistributedLock::new(store, DEFAULT_LOCK_TTL),
            executor,
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<Shop> = strategy
            .get("cache:shop:", &1u64, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap();

        assert_eq!(value, Some(shop("Cafe")));
    }

    #[tokio::test]
    async fn test_plain_value_is_a_decode_error() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .set("cache:shop:1", r#"{"id":1,"name":"Cafe"}"#, None)
            .await
            .unwrap();
        let (strategy, _executor) = strategy_over(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = strategy
            .get::<u64, Shop, _>("cache:shop:", &1, &renaming_loader(calls.clone()), TTL)
            .await
            .unwrap_err();

        assert!(matches!(err, BastionError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_late_reader_skips_rebuild_of_refreshed_entry() {
        let store = Arc::new(GatedStore::default());
        put_entry(&store.inner, "Cafe", true).await;
        let executor = Arc::new(RebuildExecutor::start(RebuildExecutorConfig::default()));
        let mut events = executor.subscribe();
        let lock = DistributedLock::new(store.clone(), DEFAULT_LOCK_TTL);
        let strategy = LogicalExpireStrategy::new(store.clone(), lock, executor.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = renaming_loader(calls.clone());

        // Late reader sees the stale entry, then stalls before locking.
        store.gate_next_read.store(true, Ordering::SeqCst);
        let late = {
            let strategy = strategy.clone();
            let loader = loader.clone();
            tokio::spawn(async move {
                strategy
                    .get::<u64, Shop, _>("cache:shop:", &1, &loader, TTL)
                    .await
            })
        };
        store.parked.notified().await;

        // Another reader rebuilds the entry in the meantime.
        let stale: Option<Shop> = strategy.get("cache:shop:", &1u64, &loader, TTL).await.unwrap();
        assert_eq!(stale, Some(shop("Cafe")));
        let event = events.recv().await.unwrap();
        assert_eq!(event.outcome, RebuildOutcome::Completed);

        store.release.notify_one();
        let served = late.await.unwrap().unwrap();

        assert_eq!(served, Some(shop("Cafe")));
        assert_eq!(executor.stats().submitted, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!store.inner.contains("lock:shop:1"));
    }
}
