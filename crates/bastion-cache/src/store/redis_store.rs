//! Redis-backed cache store.

use super::CacheStore;
use async_trait::async_trait;
use bastion_config::RedisConfig;
use bastion_core::{BastionError, BastionResult};
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Create a Redis connection pool and verify it answers PING.
pub async fn create_pool(config: &RedisConfig) -> BastionResult<Pool> {
    info!(url = %config.url, pool_size = config.pool_size, "Creating Redis connection pool");

    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| BastionError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .wait_timeout(Some(config.wait_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| BastionError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| BastionError::cache(format!("Failed to get Redis connection: {}", e)))?;
    redis::cmd("PING")
        .query_async::<String>(&mut *conn)
        .await
        .map_err(|e| BastionError::cache(format!("Redis PING failed: {}", e)))?;

    info!("Redis connection pool created successfully");
    Ok(pool)
}

/// Redis-based cache store.
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Arc<Pool>,
    compare_and_delete: Arc<redis::Script>,
}

impl RedisCacheStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: Arc<Pool>) -> Self {
        Self {
            pool,
            compare_and_delete: Arc::new(redis::Script::new(COMPARE_AND_DELETE)),
        }
    }

    /// Build the pool from configuration and wrap it.
    pub async fn connect(config: &RedisConfig) -> BastionResult<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    async fn get_conn(&self) -> BastionResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| BastionError::cache(format!("Failed to get Redis connection: {}", e)))
    }
}

/// Redis wants whole milliseconds; round sub-millisecond TTLs up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> BastionResult<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| BastionError::cache(format!("Failed to get key '{}': {}", key, e)))?;

        match &value {
            Some(_) => debug!("Cache hit for key '{}'", key),
            None => debug!("Cache miss for key '{}'", key),
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BastionResult<()> {
        let mut conn = self.get_conn().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        cmd.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| BastionError::cache(format!("Failed to set key '{}': {}", key, e)))?;

        debug!(key = %key, ttl = ?ttl, "Cached key");
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool> {
        let mut conn = self.get_conn().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(|e| BastionError::cache(format!("Failed to set key '{}' NX: {}", key, e)))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> BastionResult<bool> {
        let mut conn = self.get_conn().await?;
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| BastionError::cache(format!("Failed to delete key '{}': {}", key, e)))?;

        debug!("Deleted key '{}': {}", key, deleted > 0);
        Ok(deleted > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> BastionResult<bool> {
        let mut conn = self.get_conn().await?;
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                BastionError::cache(format!("Failed to compare-and-delete key '{}': {}", key, e))
            })?;

        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_rounds_up() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(ttl_millis(Duration::from_secs(120)), 120_000);
    }
}
