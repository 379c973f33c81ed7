//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Sources are layered: defaults, then the TOML file, then environment
//! variables of the form `TRACKING__DLQ__MAX_RETRY_ATTEMPTS=5`.

use super::error::{ConfigResult, ConfigurationError};
use super::TrackingConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "TRACKING_CONFIG_PATH";

/// Configuration file used when `TRACKING_CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/tracking.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TRACKING";

/// Loaded, validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: TrackingConfig,
    environment: String,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_file(path)
    }

    /// Load configuration from a specific TOML file; a missing file falls back to defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        let environment = crate::logging::get_environment();

        debug!(
            "Loading configuration for environment '{}' from: {}",
            environment,
            path.display()
        );

        let config = Self::build(Some(path))?;
        let manager = Self::from_config_with_env(config, &environment)?;

        Ok(Arc::new(ConfigManager {
            config_path: path.exists().then(|| path.to_path_buf()),
            ..manager
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: TrackingConfig) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();
        Self::from_config_with_env(config, &environment).map(Arc::new)
    }

    fn from_config_with_env(
        config: TrackingConfig,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        config.validate()?;

        let urls: Vec<String> = config
            .sanitized_urls()
            .into_iter()
            .map(|(name, url)| format!("{name}={url}"))
            .collect();
        info!(
            environment = %environment,
            broker = ?config.broker.provider,
            max_retry_attempts = config.dlq.max_retry_attempts,
            retry_delay_seconds = config.dlq.retry_delay_seconds,
            urls = %urls.join(" "),
            "⚙️ Configuration loaded successfully"
        );

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: None,
        })
    }

    fn build(path: Option<&Path>) -> ConfigResult<TrackingConfig> {
        let defaults = config::Config::try_from(&TrackingConfig::default())?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings
            .try_deserialize::<TrackingConfig>()
            .map_err(|e| ConfigurationError::parse(e.to_string()))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The file the configuration was read from, if one existed
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(manager.config().dlq, super::super::DlqConfig::default());
        assert!(manager.config_path().is_none());
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[dlq]\nmax_retry_attempts = 5\n\n[database.replica]\nmax_connections = 20\nmin_connections = 2\n"
        )
        .unwrap();

        let manager = ConfigManager::load_from_file(file.path()).unwrap();
        let config = manager.config();
        assert_eq!(config.dlq.max_retry_attempts, 5);
        assert_eq!(config.dlq.retry_delay_seconds, 300);
        assert_eq!(config.database.replica.max_connections, 20);
        assert_eq!(config.database.replica.acquire_timeout_ms, 5000);
        assert_eq!(config.topology.exchange, "tracking.events.exchange");
        assert!(manager.config_path().is_some());
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[consumer]\nmain_deadline_ms = 0\n").unwrap();

        let err = ConfigManager::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = TrackingConfig::default();
        config.health.check_interval_seconds = 0;
        assert!(ConfigManager::from_config(config).is_err());
    }
}
