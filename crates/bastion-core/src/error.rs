//! Unified error type for the cache layer.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Bastion.
///
/// Lock contention on the non-blocking strategies is a normal branch and is
/// never represented here; only the blocking mutex strategy reports it.
#[derive(Error, Debug)]
pub enum BastionError {
    // ============ Collaborator Errors ============
    /// Transport, pool or timeout failure talking to the shared cache.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The authoritative store (loader) failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // ============ Payload Errors ============
    /// A cached payload is corrupt or does not match the expected shape.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A value could not be encoded for the cache.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Coordination Errors ============
    /// The mutex strategy gave up waiting for another rebuilder.
    #[error("Lock contended: {0}")]
    LockContended(String),

    /// The rebuild executor refused a task (queue full or shut down).
    #[error("Rebuild rejected: {0}")]
    RebuildRejected(String),

    // ============ Infrastructure Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BastionError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::LockContended(_) => "LOCK_CONTENDED",
            Self::RebuildRejected(_) => "REBUILD_REJECTED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a cache-unavailable error.
    #[must_use]
    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::CacheUnavailable(message.into())
    }

    /// Creates a store-unavailable error.
    #[must_use]
    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable(_)
                | Self::StoreUnavailable(_)
                | Self::LockContended(_)
                | Self::RebuildRejected(_)
        )
    }
}

impl From<serde_json::Error> for BastionError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Serialization(err.to_string())
        } else {
            Self::Deserialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BastionError::cache("down").error_code(), "CACHE_UNAVAILABLE");
        assert_eq!(BastionError::store("down").error_code(), "STORE_UNAVAILABLE");
        assert_eq!(
            BastionError::Deserialization("bad".to_string()).error_code(),
            "DESERIALIZATION_ERROR"
        );
        assert_eq!(BastionError::LockContended("k".to_string()).error_code(), "LOCK_CONTENDED");
        assert_eq!(BastionError::RebuildRejected("full".to_string()).error_code(), "REBUILD_REJECTED");
        assert_eq!(BastionError::internal("oops").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(BastionError::cache("timeout").is_retriable());
        assert!(BastionError::store("connection lost").is_retriable());
        assert!(BastionError::LockContended("lock:shop:1".to_string()).is_retriable());
    }

    #[test]
    fn test_non_retriable_errors() {
        assert!(!BastionError::Deserialization("corrupt".to_string()).is_retriable());
        assert!(!BastionError::Configuration("missing url".to_string()).is_retriable());
        assert!(!BastionError::internal("bug").is_retriable());
    }

    #[test]
    fn test_json_syntax_error_is_deserialization() {
        let err = serde_json::from_str::<u32>("{not json").unwrap_err();
        let err = BastionError::from(err);
        assert!(matches!(err, BastionError::Deserialization(_)));
    }

    #[test]
    fn test_error_display() {
        let err = BastionError::cache("connection refused");
        assert_eq!(err.to_string(), "Cache unavailable: connection refused");

        let err = BastionError::Other(anyhow::anyhow!("wrapped"));
        assert_eq!(err.to_string(), "wrapped");
    }
}
