//! Cache client facade.
//!
//! Bundles the shared cache, the rebuild lock, the rebuild executor and the
//! three read strategies behind one object that domain services hold.

use crate::entry::CacheEntry;
use crate::executor::{RebuildExecutor, RebuildExecutorConfig};
use crate::lock::DistributedLock;
use crate::store::{CacheStore, RedisCacheStore};
use crate::strategy::{LogicalExpireStrategy, MutexStrategy, PassThroughStrategy};
use crate::{codec, keys};
use bastion_config::{AppConfig, CacheSettings};
use bastion_core::{BastionResult, CacheId, Loader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Entry point for cache-aside reads and writes.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
    lock: DistributedLock,
    executor: Arc<RebuildExecutor>,
    pass_through: PassThroughStrategy,
    logical: LogicalExpireStrategy,
    mutex: MutexStrategy,
    default_ttl: Duration,
}

impl CacheClient {
    /// Creates a client over an existing store and executor.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        executor: Arc<RebuildExecutor>,
        settings: &CacheSettings,
    ) -> Self {
        let lock = DistributedLock::new(store.clone(), settings.lock_ttl());

        Self {
            pass_through: PassThroughStrategy::with_null_ttl(store.clone(), settings.null_ttl()),
            logical: LogicalExpireStrategy::new(store.clone(), lock.clone(), executor.clone()),
            mutex: MutexStrategy::new(store.clone(), lock.clone())
                .with_null_ttl(settings.null_ttl())
                .with_retry(settings.mutex_retry_delay(), settings.mutex_max_attempts),
            default_ttl: settings.default_ttl(),
            store,
            lock,
            executor,
        }
    }

    /// Connects to Redis and starts a rebuild executor from configuration.
    ///
    /// Must be called inside a Tokio runtime. Also registers the metric
    /// descriptions.
    pub async fn connect(config: &AppConfig) -> BastionResult<Self> {
        crate::metrics::register_metrics();
        let store = RedisCacheStore::connect(&config.redis).await?;
        let executor = RebuildExecutor::start(RebuildExecutorConfig::from(&config.rebuild));

        info!(
            redis_url = %config.redis.url,
            workers = config.rebuild.workers,
            "Cache client ready"
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(executor),
            &config.cache,
        ))
    }

    /// The shared cache.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// The rebuild lock.
    #[must_use]
    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// The rebuild executor.
    #[must_use]
    pub fn executor(&self) -> &Arc<RebuildExecutor> {
        &self.executor
    }

    /// TTL configured for callers without their own.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Writes a value with a physical TTL.
    pub async fn set<V>(&self, key: &str, value: &V, ttl: Duration) -> BastionResult<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        self.store.set(key, &codec::encode(value)?, Some(ttl)).await
    }

    /// Writes a value that stays fresh for `ttl`, with no physical TTL.
    pub async fn set_with_logical_expire<V>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> BastionResult<()>
    where
        V: Serialize + Sync,
    {
        let raw = CacheEntry::expiring_in(value, ttl).encode()?;
        self.store.set(key, &raw, None).await
    }

    /// Reads through the cache, caching misses as empty markers.
    pub async fn query_with_pass_through<I, V, L>(
        &self,
        key_prefix: &str,
        id: &I,
        loader: &L,
        ttl: Duration,
    ) -> BastionResult<Option<V>>
    where
        I: CacheId,
        V: Serialize + DeserializeOwned + Send + Sync,
        L: Loader<I, V> + ?Sized,
    {
        self.pass_through.get(key_prefix, id, loader, ttl).await
    }

    /// Reads a logically expiring entry, serving stale data during rebuild.
    pub async fn query_with_logical_expire<I, V, L>(
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
        self.logical.get(key_prefix, id, loader, ttl).await
    }

    /// Reads through the cache with a single loader per key on a miss.
    pub async fn query_with_mutex<I, V, L>(
        &self,
        key_prefix: &str,
        id: &I,
        loader: &L,
        ttl: Duration,
    ) -> BastionResult<Option<V>>
    where
        I: CacheId,
        V: Serialize + DeserializeOwned + Send + Sync,
        L: Loader<I, V> + ?Sized,
    {
        self.mutex.get(key_prefix, id, loader, ttl).await
    }

    /// Loads an entity and stores it as a logically expiring entry.
    ///
    /// Returns `false`, writing nothing, when the store has no such entity.
    pub async fn warm_up<I, V, L>(
        &self,
        key_prefix: &str,
        id: &I,
        loader: &L,
        ttl: Duration,
    ) -> BastionResult<bool>
    where
        I: CacheId,
        V: Serialize + Send + Sync,
        L: Loader<I, V> + ?Sized,
    {
        let key = keys::data_key(key_prefix, id);
        let Some(value) = loader.load(id).await? else {
            debug!(key = %key, "Nothing to warm up");
            return Ok(false);
        };

        self.set_with_logical_expire(&key, &value, ttl).await?;
        debug!(key = %key, "Cache entry warmed up");
        Ok(true)
    }

    /// Drops the cached entry for an entity after its store record changed.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn invalidate<I: CacheId>(&self, key_prefix: &str, id: &I) -> BastionResult<bool> {
        let key = keys::data_key(key_prefix, id);
        let removed = self.store.delete(&key).await?;
        debug!(key = %key, removed, "Cache entry invalidated");
        Ok(removed)
    }
}
