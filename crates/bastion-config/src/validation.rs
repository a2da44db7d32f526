//! Configuration validation.
//!
//! Collects every problem in one pass so a misconfigured deployment fails at
//! startup with the full list instead of one error at a time.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size must be between 1 and the maximum.
    InvalidPoolSize { value: usize, maximum: usize },
    /// A TTL or timeout must be positive.
    NonPositiveDuration { name: String },
    /// A count (workers, capacity, attempts) must be positive.
    NonPositiveCount { name: String },
    /// Sampling ratio must be between 0.0 and 1.0.
    InvalidSamplingRatio { value: f64 },
    /// Log filter directive is empty.
    EmptyLogFilter,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::InvalidPoolSize { value, maximum } => {
                write!(f, "Invalid pool size {} (must be between 1 and {})", value, maximum)
            }
            Self::NonPositiveDuration { name } => {
                write!(f, "'{}' must be positive", name)
            }
            Self::NonPositiveCount { name } => {
                write!(f, "'{}' must be at least 1", name)
            }
            Self::InvalidSamplingRatio { value } => {
                write!(
                    f,
                    "Invalid sampling ratio: {} (must be between 0.0 and 1.0)",
                    value
                )
            }
            Self::EmptyLogFilter => write!(f, "Log filter cannot be empty"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: usize = 1000;

    /// Validates the entire configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_cache(&config.cache, &mut errors);
        Self::validate_rebuild(&config.rebuild, &mut errors);
        Self::validate_telemetry(&config.telemetry, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_redis(config: &crate::RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        match Url::parse(&config.url) {
            Ok(url) if url.scheme() == "redis" || url.scheme() == "rediss" => {}
            Ok(_) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if config.pool_size == 0 || config.pool_size > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::InvalidPoolSize {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        if config.wait_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "redis.wait_timeout_ms".to_string(),
            });
        }
    }

    fn validate_cache(config: &crate::CacheSettings, errors: &mut Vec<ConfigValidationError>) {
        let durations = [
            ("cache.null_ttl_secs", config.null_ttl_secs),
            ("cache.lock_ttl_secs", config.lock_ttl_secs),
            ("cache.default_ttl_secs", config.default_ttl_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveDuration {
                    name: name.to_string(),
                });
            }
        }

        if config.mutex_max_attempts == 0 {
            errors.push(ConfigValidationError::NonPositiveCount {
                name: "cache.mutex_max_attempts".to_string(),
            });
        }
    }

    fn validate_rebuild(config: &crate::RebuildSettings, errors: &mut Vec<ConfigValidationError>) {
        if config.workers == 0 {
            errors.push(ConfigValidationError::NonPositiveCount {
                name: "rebuild.workers".to_string(),
            });
        }
        if config.queue_capacity == 0 {
            errors.push(ConfigValidationError::NonPositiveCount {
                name: "rebuild.queue_capacity".to_string(),
            });
        }
    }

    fn validate_telemetry(
        config: &bastion_core::telemetry::TelemetryConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        if config.log_filter.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyLogFilter);
        }

        if !(0.0..=1.0).contains(&config.sampling_ratio) {
            errors.push(ConfigValidationError::InvalidSamplingRatio {
                value: config.sampling_ratio,
            });
        }

        if let Some(ref endpoint) = config.otlp_endpoint {
            if Url::parse(endpoint).is_err() {
                errors.push(ConfigValidationError::InvalidUrl {
                    url_type: "otlp_endpoint".to_string(),
                    message: format!("Invalid URL format: {}", endpoint),
                });
            }
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_redis_scheme() {
        let mut config = AppConfig::default();
        config.redis.url = "http://localhost:6379".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(
            &errors[0],
            ConfigValidationError::InvalidUrl { url_type, .. } if url_type == "redis"
        ));
    }

    #[test]
    fn test_unparseable_redis_url() {
        let mut config = AppConfig::default();
        config.redis.url = "not a url".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = AppConfig::default();
        config.redis.pool_size = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::InvalidPoolSize { value: 0, maximum: 1000 }]
        );
    }

    #[test]
    fn test_zero_ttls() {
        let mut config = AppConfig::default();
        config.cache.null_ttl_secs = 0;
        config.cache.lock_ttl_secs = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ConfigValidationError::NonPositiveDuration {
            name: "cache.lock_ttl_secs".to_string()
        }));
    }

    #[test]
    fn test_zero_workers_and_capacity() {
        let mut config = AppConfig::default();
        config.rebuild.workers = 0;
        config.rebuild.queue_capacity = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_invalid_sampling_ratio() {
        let mut config = AppConfig::default();
        config.telemetry.sampling_ratio = 1.5;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors, vec![ConfigValidationError::InvalidSamplingRatio { value: 1.5 }]);
    }

    #[test]
    fn test_multiple_errors() {
        let mut config = AppConfig::default();
        config.redis.url = "bad".to_string();
        config.cache.mutex_max_attempts = 0;
        config.telemetry.log_filter = "  ".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_format_validation_errors() {
        let errors = vec![
            ConfigValidationError::EmptyLogFilter,
            ConfigValidationError::NonPositiveCount {
                name: "rebuild.workers".to_string(),
            },
        ];
        let formatted = format_validation_errors(&errors);
        assert!(formatted.contains("1. Log filter cannot be empty"));
        assert!(formatted.contains("2. 'rebuild.workers' must be at least 1"));
    }
}
