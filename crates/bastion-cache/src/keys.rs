//! Cache key naming.
//!
//! Data lives under `cache:<entity>:<id>`, rebuild locks under
//! `lock:<entity>:<id>`. A confirmed-missing entity is the empty string
//! stored under its data key.

use std::fmt::Display;

/// Namespace of data keys.
pub const CACHE_NAMESPACE: &str = "cache";

/// Namespace of lock keys.
pub const LOCK_NAMESPACE: &str = "lock";

/// Value stored for an entity the store confirmed does not exist.
pub const EMPTY_MARKER: &str = "";

/// Data key prefix for an entity type, e.g. `cache:shop:`.
#[must_use]
pub fn data_prefix(entity: &str) -> String {
    format!("{}:{}:", CACHE_NAMESPACE, entity)
}

/// Full data key: prefix followed by the identifier.
#[must_use]
pub fn data_key(prefix: &str, id: &impl Display) -> String {
    format!("{}{}", prefix, id)
}

/// Lock key for an entity type and identifier.
#[must_use]
pub fn lock_key(entity: &str, id: &impl Display) -> String {
    format!("{}:{}:{}", LOCK_NAMESPACE, entity, id)
}

/// Lock key guarding the data key `prefix + id`.
///
/// `cache:shop:` maps to `lock:shop:<id>`; a prefix outside the `cache`
/// namespace is kept whole, `shop:` maps to `lock:shop:<id>`.
#[must_use]
pub fn lock_key_for(prefix: &str, id: &impl Display) -> String {
    let scoped = prefix
        .strip_prefix(CACHE_NAMESPACE)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(prefix);
    format!("{}:{}{}", LOCK_NAMESPACE, scoped, id)
}

/// Whether a cached value is the empty marker.
///
/// Whitespace-only values count as empty so a blank payload is never fed to
/// the deserializer.
#[must_use]
pub fn is_empty_marker(raw: &str) -> bool {
    raw.trim().is_empty()
}
