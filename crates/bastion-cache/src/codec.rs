//! JSON encoding of cached values.
//!
//! Failures are split by direction: encoding a value is a
//! [`BastionError::Serialization`], reading a cached payload back is a
//! [`BastionError::Deserialization`] carrying the key that held it.

use bastion_core::{BastionError, BastionResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> BastionResult<String> {
    serde_json::to_string(value).map_err(|e| BastionError::Serialization(e.to_string()))
}

/// Decodes a payload read from `key`.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> BastionResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| BastionError::Deserialization(format!("key '{}': {}", key, e)))
}
