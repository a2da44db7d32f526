//! Bastion Cache - cache-aside protection for a slow authoritative store.
//!
//! Sits between request handlers and the store, backed by a shared Redis
//! cache, and guards the store against:
//! - cache penetration (empty markers for confirmed-missing entities)
//! - cache breakdown (a single rebuilder per key, coordinated through a
//!   distributed lock in the cache itself)
//! - latency spikes during rebuild (stale-while-rebuild via logical expiry)
//!
//! # Architecture
//!
//! ```text
//! caller ──► strategy ──► CacheStore (Redis)
//!               │  │
//!               │  └────► DistributedLock (SET NX PX / compare-and-delete)
//!               │
//!               ├──► Loader (authoritative store)
//!               │
//!               └──► RebuildExecutor ──► RebuildTask ──► CacheStore
//! ```
//!
//! | Strategy           | On miss                  | On expiry                          |
//! |--------------------|--------------------------|------------------------------------|
//! | `PassThrough`      | load, cache or mark empty | physical TTL, reload on next miss |
//! | `LogicalExpire`    | return nothing           | return stale, rebuild in background |
//! | `Mutex`            | one loader, others retry | physical TTL, reload on next miss |
//!
//! # Example
//!
//! ```ignore
//! use bastion_cache::{keys, CacheClient, MemoryCacheStore, RebuildExecutor};
//! use bastion_config::CacheSettings;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryCacheStore::new());
//! let executor = Arc::new(RebuildExecutor::start(Default::default()));
//! let client = CacheClient::new(store, executor, &CacheSettings::default());
//!
//! let prefix = keys::data_prefix("shop");
//! let shop: Option<Shop> = client
//!     .query_with_pass_through(&prefix, &1u64, &*shop_loader, Duration::from_secs(1800))
//!     .await?;
//! ```

pub mod client;
pub mod codec;
pub mod entry;
pub mod executor;
pub mod keys;
pub mod lock;
pub mod metrics;
pub mod store;
pub mod strategy;

pub use client::CacheClient;
pub use entry::CacheEntry;
pub use executor::{
    RebuildEvent, RebuildExecutor, RebuildExecutorConfig, RebuildExecutorStats, RebuildJob,
    RebuildOutcome,
};
pub use lock::{DistributedLock, LockToken, DEFAULT_LOCK_TTL};
pub use store::{create_pool, CacheStore, MemoryCacheStore, RedisCacheStore};
pub use strategy::{
    LogicalExpireStrategy, MutexStrategy, PassThroughStrategy, RebuildTask, DEFAULT_NULL_TTL,
};

pub use bastion_core::{BastionError, BastionResult, CacheId, FnLoader, Loader};
