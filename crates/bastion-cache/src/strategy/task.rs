//! Background rebuild of one logically expiring entry.

use crate::entry::CacheEntry;
use crate::executor::RebuildJob;
use crate::lock::{DistributedLock, LockToken};
use crate::metrics::CacheMetrics;
use crate::store::CacheStore;
use bastion_core::{BastionError, BastionResult, CacheId, Loader};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reloads one entity and rewrites its cache entry, then releases the lock
/// that made this task the only rebuilder of the key.
///
/// The lock is released however the rebuild ends, including a panicking
/// loader.
pub struct RebuildTask<I, V, L: ?Sized> {
    id: I,
    cache_key: String,
    ttl: Duration,
    loader: Arc<L>,
    store: Arc<dyn CacheStore>,
    lock: DistributedLock,
    token: LockToken,
    _value: PhantomData<fn() -> V>,
}

impl<I, V, L> RebuildTask<I, V, L>
where
    I: CacheId,
    V: Serialize + Send + Sync + 'static,
    L: Loader<I, V> + ?Sized + 'static,
{
    /// Creates a task for `cache_key`, taking ownership of the held lock.
    pub fn new(
        id: I,
        cache_key: String,
        ttl: Duration,
        loader: Arc<L>,
        store: Arc<dyn CacheStore>,
        lock: DistributedLock,
        token: LockToken,
    ) -> Self {
        Self {
            id,
            cache_key,
            ttl,
            loader,
            store,
            lock,
            token,
            _value: PhantomData,
        }
    }

    /// Lock held for the duration of the task.
    #[must_use]
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    async fn rebuild(&self) -> BastionResult<()> {
        CacheMetrics::store_load("logical_expire");

        match self.loader.load(&self.id).await? {
            Some(value) => {
                let raw = CacheEntry::expiring_in(value, self.ttl).encode()?;
                self.store.set(&self.cache_key, &raw, None).await?;
                debug!(key = %self.cache_key, "Cache entry rebuilt");
            }
            None => {
                self.store.delete(&self.cache_key).await?;
                info!(key = %self.cache_key, "Entity gone from store, cache entry removed");
            }
        }
        Ok(())
    }

    async fn execute(self) -> BastionResult<()> {
        let result = AssertUnwindSafe(self.rebuild())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(BastionError::internal(format!(
                    "rebuild of '{}' panicked",
                    self.cache_key
                )))
            });

        match self.lock.unlock(&self.token).await {
            Ok(true) => {}
            Ok(false) => warn!(
                key = %self.cache_key,
                lock_key = %self.token.key(),
                "Rebuild outlived its lock"
            ),
            Err(e) => warn!(
                key = %self.cache_key,
                lock_key = %self.token.key(),
                error = %e,
                "Failed to release rebuild lock, it will expire on its own"
            ),
        }

        result
    }
}

impl<I, V, L> RebuildJob for RebuildTask<I, V, L>
where
    I: CacheId,
    V: Serialize + Send + Sync + 'static,
    L: Loader<I, V> + ?Sized + 'static,
{
    fn key(&self) -> &str {
        &self.cache_key
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, BastionResult<()>> {
        (*self).execute().boxed()
    }
}
