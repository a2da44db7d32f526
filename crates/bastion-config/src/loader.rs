//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use bastion_core::BastionError;
use config::{Config, ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `BASTION__` prefix
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, BastionError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, BastionError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// The previous configuration stays in place if the new one is invalid.
    pub async fn reload(&self) -> Result<(), BastionError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &Path) -> Result<AppConfig, BastionError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("BASTION_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, dir = %config_dir.display(), "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = config_dir.join(format!("{}.toml", name));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BASTION")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_bastion_error)?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_bastion_error)?;
        app_config.app.environment = environment;

        ConfigValidator::validate(&app_config)
            .map_err(|errors| BastionError::Configuration(format_validation_errors(&errors)))?;

        Ok(app_config)
    }
}

fn config_error_to_bastion_error(err: ConfigError) -> BastionError {
    BastionError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_loads_defaults_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path()).unwrap();

        let config = loader.get().await;
        assert_eq!(config.cache.null_ttl_secs, 120);
        assert_eq!(config.rebuild.workers, 10);
    }

    #[tokio::test]
    async fn test_default_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[cache]\nnull_ttl_secs = 60\n\n[rebuild]\nworkers = 4\n",
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.cache.null_ttl_secs, 60);
        assert_eq!(config.cache.lock_ttl_secs, 10);
        assert_eq!(config.rebuild.workers, 4);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[rebuild]\nworkers = 0\n").unwrap();

        let err = ConfigLoader::new(dir.path()).err().unwrap();
        assert!(matches!(err, BastionError::Configuration(msg) if msg.contains("rebuild.workers")));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        fs::write(&path, "[cache]\nlock_ttl_secs = 5\n").unwrap();

        let loader = ConfigLoader::new(dir.path()).unwrap();
        assert_eq!(loader.get().await.cache.lock_ttl_secs, 5);

        fs::write(&path, "[cache]\nlock_ttl_secs = 15\n").unwrap();
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.cache.lock_ttl_secs, 15);
    }
}
