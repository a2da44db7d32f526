//! Cache-aside read strategies.
//!
//! - [`PassThroughStrategy`]: load on miss, remember misses as empty markers
//! - [`LogicalExpireStrategy`]: serve stale entries, rebuild in the background
//! - [`MutexStrategy`]: load on miss with one loader per key, others retry

mod logical;
mod mutex;
mod pass_through;
mod task;

pub use logical::LogicalExpireStrategy;
pub use mutex::{MutexStrategy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use pass_through::PassThroughStrategy;
pub use task::RebuildTask;

use crate::codec;
use crate::keys::{is_empty_marker, EMPTY_MARKER};
use crate::store::CacheStore;
use bastion_core::BastionResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Lifetime of an empty marker.
pub const DEFAULT_NULL_TTL: Duration = Duration::from_secs(120);

/// What a plain (non-envelope) cache read found.
#[derive(Debug)]
pub(crate) enum Lookup<V> {
    Hit(V),
    Empty,
    Miss,
}

/// Reads and decodes a plain cached value.
pub(crate) async fn lookup<V>(store: &dyn CacheStore, key: &str) -> BastionResult<Lookup<V>>
where
    V: DeserializeOwned,
{
    match store.get(key).await? {
        None => Ok(Lookup::Miss),
        Some(raw) if is_empty_marker(&raw) => Ok(Lookup::Empty),
        Some(raw) => codec::decode(key, &raw).map(Lookup::Hit),
    }
}

/// Writes a loaded value with `ttl`, or the empty marker with `null_ttl`.
pub(crate) async fn populate<V>(
    store: &dyn CacheStore,
    key: &str,
    value: Option<&V>,
    ttl: Duration,
    null_ttl: Duration,
) -> BastionResult<()>
where
    V: Serialize,
{
    match value {
        Some(value) => store.set(key, &codec::encode(value)?, Some(ttl)).await,
        None => store.set(key, EMPTY_MARKER, Some(null_ttl)).await,
    }
}
