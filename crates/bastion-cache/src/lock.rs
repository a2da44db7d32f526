//! Distributed rebuild lock kept in the shared cache.
//!
//! A lock is a key whose presence means "someone is rebuilding". It is taken
//! with one atomic set-if-absent and carries a physical TTL, so a holder that
//! crashes without releasing it only blocks rebuilds for that long. The value
//! is a per-acquisition owner id; release deletes the key only while it still
//! holds that id, so a holder whose lock already expired cannot release the
//! next holder's lock.

use crate::metrics::CacheMetrics;
use crate::store::CacheStore;
use bastion_core::BastionResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default lock lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Proof of a successful [`DistributedLock::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    owner: String,
}

impl LockToken {
    /// The lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner id stored under the key.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Non-blocking mutual exclusion through the shared cache.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DistributedLock {
    /// Creates a lock helper whose locks live for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Lock lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Tries once to take the lock.
    ///
    /// Returns `Some` iff this call created the key. Never waits or retries;
    /// the caller decides what to do when the lock is held.
    pub async fn try_lock(&self, key: &str) -> BastionResult<Option<LockToken>> {
        let owner = Uuid::new_v4().to_string();
        let acquired = self.store.set_if_absent(key, &owner, self.ttl).await?;
        CacheMetrics::lock_attempt(acquired);

        if acquired {
            debug!(lock_key = %key, "Lock acquired");
            Ok(Some(LockToken {
                key: key.to_string(),
                owner,
            }))
        } else {
            debug!(lock_key = %key, "Lock held elsewhere");
            Ok(None)
        }
    }

    /// Releases a lock taken by this token.
    ///
    /// Returns `false` if the lock had already expired or belongs to someone
    /// else; the key is left untouched in that case.
    pub async fn unlock(&self, token: &LockToken) -> BastionResult<bool> {
        let released = self
            .store
            .compare_and_delete(&token.key, &token.owner)
            .await?;

        if released {
            debug!(lock_key = %token.key, "Lock released");
        } else {
            warn!(lock_key = %token.key, "Lock was no longer held at release");
        }
        Ok(released)
    }

    /// Deletes the lock key regardless of owner.
    ///
    /// For operator recovery only; normal code paths release through
    /// [`unlock`](Self::unlock).
    pub async fn force_unlock(&self, key: &str) -> BastionResult<bool> {
        let deleted = self.store.delete(key).await?;
        warn!(lock_key = %key, deleted, "Lock force-released");
        Ok(deleted)
    }
}
