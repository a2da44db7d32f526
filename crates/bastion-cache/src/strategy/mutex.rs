//! Single-flight first load behind the distributed lock.

use super::{lookup, populate, Lookup, DEFAULT_NULL_TTL};
use crate::keys;
use crate::lock::{DistributedLock, LockToken};
use crate::metrics::{CacheMetrics, Outcome};
use crate::store::CacheStore;
use bastion_core::{BastionError, BastionResult, CacheId, Loader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const STRATEGY: &str = "mutex";

/// Pause between attempts while another caller holds the lock.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Attempts before giving up on a held lock.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Pass-through lookup where only the lock holder queries the store on a
/// miss. Everyone else sleeps and re-reads the cache.
#[derive(Clone)]
pub struct MutexStrategy {
    store: Arc<dyn CacheStore>,
    lock: DistributedLock,
    null_ttl: Duration,
    retry_delay: Duration,
    max_attempts: u32,
}

impl MutexStrategy {
    /// Creates a strategy with default timings.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, lock: DistributedLock) -> Self {
        Self {
            store,
            lock,
            null_ttl: DEFAULT_NULL_TTL,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the empty-marker TTL.
    #[must_use]
    pub fn with_null_ttl(mut self, null_ttl: Duration) -> Self {
        self.null_ttl = null_ttl;
        self
    }

    /// Sets the retry pause and the attempt limit.
    #[must_use]
    pub fn with_retry(mut self, retry_delay: Duration, max_attempts: u32) -> Self {
        self.retry_delay = retry_delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Looks up `key_prefix + id`, loading on a miss under the key's lock.
    ///
    /// Fails with [`BastionError::LockContended`] if the lock stays held for
    /// every attempt and the cache is still empty.
    pub async fn get<I, V, L>(
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
        let key = keys::data_key(key_prefix, id);
        let lock_key = keys::lock_key_for(key_prefix, id);

        for attempt in 1..=self.max_attempts {
            if let Some(found) = self.cached::<V>(&key).await? {
                return Ok(found);
            }

            if let Some(token) = self.lock.try_lock(&lock_key).await? {
                let result = self.load_locked(&key, id, loader, ttl).await;
                self.release(&token).await;
                return result;
            }

            debug!(key = %key, attempt, "Waiting for concurrent load");
            tokio::time::sleep(self.retry_delay).await;
        }

        warn!(key = %key, attempts = self.max_attempts, "Gave up waiting for rebuild lock");
        Err(BastionError::LockContended(lock_key))
    }

    /// `Some` when the cache answered, with the value or confirmed absence.
    async fn cached<V: DeserializeOwned>(&self, key: &str) -> BastionResult<Option<Option<V>>> {
        match lookup::<V>(self.store.as_ref(), key).await? {
            Lookup::Hit(value) => {
                CacheMetrics::lookup(STRATEGY, Outcome::Hit);
                Ok(Some(Some(value)))
            }
            Lookup::Empty => {
                CacheMetrics::lookup(STRATEGY, Outcome::Empty);
                Ok(Some(None))
            }
            Lookup::Miss => Ok(None),
        }
    }

    async fn load_locked<I, V, L>(
        &self,
        key: &str,
        id: &I,
        loader: &L,
        ttl: Duration,
    ) -> BastionResult<Option<V>>
    where
        I: CacheId,
        V: Serialize + DeserializeOwned + Send + Sync,
        L: Loader<I, V> + ?Sized,
    {
        // Another holder may have populated the key between our read and our lock.
        if let Some(found) = self.cached::<V>(key).await? {
            return Ok(found);
        }

        CacheMetrics::lookup(STRATEGY, Outcome::Miss);
        CacheMetrics::store_load(STRATEGY);
        let loaded = loader.load(id).await?;
        populate(self.store.as_ref(), key, loaded.as_ref(), ttl, self.null_ttl).await?;
        Ok(loaded)
    }

    async fn release(&self, token: &LockToken) {
        if let Err(e) = self.lock.unlock(token).await {
            warn!(lock_key = %token.key(), error = %e, "Failed to release load lock, it will expire on its own");
        }
    }
}
