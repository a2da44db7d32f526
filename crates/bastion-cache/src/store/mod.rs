//! The shared cache collaborator.
//!
//! Strategies only ever talk to the cache through [`CacheStore`], a string
//! key/value view with per-key TTL and the two atomic primitives the lock
//! needs. [`RedisCacheStore`] is the production backend;
//! [`MemoryCacheStore`] is the in-process test double.

mod memory;
mod redis_store;

pub use memory::MemoryCacheStore;
pub use redis_store::{create_pool, RedisCacheStore};

use async_trait::async_trait;
use bastion_core::BastionResult;
use std::time::Duration;

/// String-keyed cache with per-key TTL.
///
/// Every method that fails to reach the cache returns
/// [`BastionError::CacheUnavailable`](bastion_core::BastionError::CacheUnavailable).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a value. `None` if the key is absent or physically expired.
    async fn get(&self, key: &str) -> BastionResult<Option<String>>;

    /// Replaces the value. `ttl = None` stores it without physical expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BastionResult<()>;

    /// Stores the value only if the key is absent. Returns `true` iff this
    /// call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool>;

    /// Deletes the key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> BastionResult<bool>;

    /// Deletes the key only if its current value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> BastionResult<bool>;
}
