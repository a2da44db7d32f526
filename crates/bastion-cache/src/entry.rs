//! Logically expiring cache envelope.

use crate::codec;
use bastion_core::BastionResult;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value together with the instant it stops being fresh.
///
/// The expiry is cooperative: the entry is stored without a physical TTL and
/// readers decide what to do with a stale one. Stored as
/// `{"data": <payload>, "expireTime": "<RFC 3339>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value.
    #[serde(rename = "data")]
    pub payload: T,

    /// When the payload becomes stale.
    #[serde(rename = "expireTime")]
    pub logical_expiry: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Wraps a payload with an explicit expiry.
    pub fn new(payload: T, logical_expiry: DateTime<Utc>) -> Self {
        Self {
            payload,
            logical_expiry,
        }
    }

    /// Wraps a payload that stays fresh for `ttl` from now.
    pub fn expiring_in(payload: T, ttl: Duration) -> Self {
        Self::new(payload, expiry_after(Utc::now(), ttl))
    }

    /// Whether the entry is stale at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.logical_expiry <= now
    }

    /// Whether the entry is stale now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl<T: Serialize> CacheEntry<T> {
    /// Encodes the entry for storage.
    pub fn encode(&self) -> BastionResult<String> {
        codec::encode(self)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// Decodes an entry read from `key`.
    pub fn decode(key: &str, raw: &str) -> BastionResult<Self> {
        codec::decode(key, raw)
    }
}

/// `now + ttl`, saturating at the latest representable instant.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::BastionError;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    fn cafe() -> Shop {
        Shop {
            id: 1,
            name: "Cafe".to_string(),
        }
    }

    #[test]
    fn test_wire_format() {
        let expiry = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let raw = CacheEntry::new(cafe(), expiry).encode().unwrap();
        assert_eq!(
            raw,
            r#"{"data":{"id":1,"name":"Cafe"},"expireTime":"2024-01-01T12:00:00Z"}"#
        );

        let decoded = CacheEntry::<Shop>::decode("cache:shop:1", &raw).unwrap();
        assert_eq!(decoded.payload, cafe());
        assert_eq!(decoded.logical_expiry, expiry);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry::new(cafe(), now);
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_expiring_in_is_fresh() {
        let entry = CacheEntry::expiring_in(cafe(), Duration::from_secs(20));
        assert!(!entry.is_expired());
        assert!(entry.logical_expiry > Utc::now() + chrono::Duration::seconds(10));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::expiring_in(cafe(), Duration::from_secs(u64::MAX));
        assert_eq!(entry.logical_expiry, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_plain_value_is_not_an_entry() {
        let err = CacheEntry::<Shop>::decode("cache:shop:1", r#"{"id":1,"name":"Cafe"}"#).unwrap_err();
        assert!(matches!(err, BastionError::Deserialization(_)));
    }
}
