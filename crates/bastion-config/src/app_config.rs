//! Application configuration structures.

use bastion_core::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Shared cache (Redis) connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache strategy settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Rebuild executor settings.
    #[serde(default)]
    pub rebuild: RebuildSettings,

    /// Logging and tracing.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "bastion".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Time to wait for a pooled connection, in milliseconds.
    pub wait_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
            wait_timeout_ms: 1000,
        }
    }
}

impl RedisConfig {
    /// Returns the pool wait timeout as a Duration.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Cache strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Physical TTL of the empty marker written for missing entities.
    pub null_ttl_secs: u64,
    /// Physical TTL of rebuild lock keys.
    pub lock_ttl_secs: u64,
    /// TTL applied when a caller does not pick one.
    pub default_ttl_secs: u64,
    /// Sleep between attempts of the mutex strategy.
    pub mutex_retry_delay_ms: u64,
    /// Attempts of the mutex strategy before giving up.
    pub mutex_max_attempts: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            null_ttl_secs: 120,
            lock_ttl_secs: 10,
            default_ttl_secs: 1800,
            mutex_retry_delay_ms: 50,
            mutex_max_attempts: 20,
        }
    }
}

impl CacheSettings {
    /// Returns the empty-marker TTL as a Duration.
    #[must_use]
    pub const fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    /// Returns the lock TTL as a Duration.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Returns the default data TTL as a Duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Returns the mutex retry delay as a Duration.
    #[must_use]
    pub const fn mutex_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mutex_retry_delay_ms)
    }
}

/// Rebuild executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildSettings {
    /// Number of rebuilds allowed to run at once.
    pub workers: usize,
    /// Pending rebuilds held before submissions are rejected.
    pub queue_capacity: usize,
    /// Grace period for running rebuilds on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1024,
            shutdown_timeout_secs: 30,
        }
    }
}

impl RebuildSettings {
    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_settings_durations() {
        let settings = CacheSettings::default();
        assert_eq!(settings.null_ttl(), Duration::from_secs(120));
        assert_eq!(settings.lock_ttl(), Duration::from_secs(10));
        assert_eq!(settings.default_ttl(), Duration::from_secs(1800));
        assert_eq!(settings.mutex_retry_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let settings: CacheSettings = serde_json::from_str(r#"{"null_ttl_secs": 30}"#).unwrap();
        assert_eq!(settings.null_ttl_secs, 30);
        assert_eq!(settings.lock_ttl_secs, 10);
        assert_eq!(settings.mutex_max_attempts, 20);
    }

    #[test]
    fn test_rebuild_defaults() {
        let settings = RebuildSettings::default();
        assert_eq!(settings.workers, 10);
        assert_eq!(settings.queue_capacity, 1024);
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(30));
    }
}
