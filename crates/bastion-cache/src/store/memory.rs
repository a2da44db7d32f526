//! In-process cache store.

use super::CacheStore;
use async_trait::async_trait;
use bastion_core::BastionResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A [`CacheStore`] held in process memory, used as the test double.
///
/// Expiry is measured on the Tokio clock, so tests running with a paused
/// runtime can move TTLs forward with `tokio::time::advance`. Expired keys
/// are dropped lazily on access and nothing bounds the map's size. A TTL too
/// large to represent stores the key without expiry.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining physical TTL of a live key. `None` when the key is absent
    /// or stored without expiry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slots = self.slots.lock();
        slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether the key is live.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.slots.lock().get(key).is_some_and(|slot| slot.is_live(now))
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().values().filter(|slot| slot.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(slots: &mut HashMap<String, Slot>, key: &str, now: Instant) -> Option<String> {
        match slots.get(key) {
            Some(slot) if slot.is_live(now) => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> BastionResult<Option<String>> {
        let now = Instant::now();
        Ok(Self::live_value(&mut self.slots.lock(), key, now))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BastionResult<()> {
        let now = Instant::now();
        self.slots.lock().insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if Self::live_value(&mut slots, key, now).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> BastionResult<bool> {
        let now = Instant::now();
        let removed = self.slots.lock().remove(key);
        Ok(removed.is_some_and(|slot| slot.is_live(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> BastionResult<bool> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        match Self::live_value(&mut slots, key, now) {
            Some(current) if current == expected => {
                slots.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
