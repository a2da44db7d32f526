//! Pass-through reads with empty markers.

use super::{lookup, populate, Lookup, DEFAULT_NULL_TTL};
use crate::keys;
use crate::metrics::{CacheMetrics, Outcome};
use crate::store::CacheStore;
use bastion_core::{BastionResult, CacheId, Loader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const STRATEGY: &str = "pass_through";

/// Read-through lookup that caches "not found" as an empty marker.
///
/// Repeated lookups of an id the store does not have hit the marker instead
/// of the store until the marker's TTL runs out. Concurrent misses on the
/// same key each go to the store; there is no locking.
#[derive(Clone)]
pub struct PassThroughStrategy {
    store: Arc<dyn CacheStore>,
    null_ttl: Duration,
}

impl PassThroughStrategy {
    /// Creates a strategy with the default empty-marker TTL.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_null_ttl(store, DEFAULT_NULL_TTL)
    }

    /// Creates a strategy with a custom empty-marker TTL.
    #[must_use]
    pub fn with_null_ttl(store: Arc<dyn CacheStore>, null_ttl: Duration) -> Self {
        Self { store, null_ttl }
    }

    /// Empty-marker TTL.
    #[must_use]
    pub const fn null_ttl(&self) -> Duration {
        self.null_ttl
    }

    /// Looks up `key_prefix + id`, loading from the store on a miss.
    ///
    /// `Ok(None)` means the store confirmed the entity does not exist, either
    /// now or within the last empty-marker TTL.
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

        match lookup::<V>(self.store.as_ref(), &key).await? {
            Lookup::Hit(value) => {
                CacheMetrics::lookup(STRATEGY, Outcome::Hit);
                return Ok(Some(value));
            }
            Lookup::Empty => {
                CacheMetrics::lookup(STRATEGY, Outcome::Empty);
                return Ok(None);
            }
            Lookup::Miss => CacheMetrics::lookup(STRATEGY, Outcome::Miss),
        }

        CacheMetrics::store_load(STRATEGY);
        let loaded = loader.load(id).await?;
        populate(self.store.as_ref(), &key, loaded.as_ref(), ttl, self.null_ttl).await?;

        debug!(key = %key, found = loaded.is_some(), "Cache populated from store");
        Ok(loaded)
    }
}
