//! Configuration management for ratekeeper.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::LimiterSpec;

/// Prefix for environment overrides, e.g. `RATEKEEPER_LIMITER__MAX_REQUESTS=10`.
pub const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for ratekeeper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which limiter to build and its parameters
    #[serde(default)]
    pub limiter: LimiterSpec,

    /// Client state housekeeping
    #[serde(default)]
    pub store: StoreConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Idle client eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Evict clients unseen for this many seconds; unset keeps them forever
    #[serde(default)]
    pub idle_ttl_secs: Option<f64>,

    /// How often the sweeper runs, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> f64 {
    30.0
}

impl RatekeeperConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file, overlaid with
    /// `RATEKEEPER_*` environment variables.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `RATEKEEPER_LOGGING__FORMAT=json`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| RatekeeperError::Config(e.to_string()))
    }

    /// Idle TTL as a duration, if eviction is enabled and the value is usable.
    pub fn idle_ttl(&self) -> Option<std::time::Duration> {
        self.store
            .idle_ttl_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| std::time::Duration::try_from_secs_f64(secs).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{Resolution, StrategyKind};

    #[test]
    fn test_defaults() {
        let config = RatekeeperConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.limiter.kind(), StrategyKind::Fixed);
        assert_eq!(config.store.idle_ttl_secs, None);
        assert_eq!(config.idle_ttl(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
logging:
  level: debug
  format: json
limiter:
  kind: sliding_log
  max_requests: 10
  window_secs: 60
  resolution: fractional
store:
  idle_ttl_secs: 300
  sweep_interval_secs: 15
"#;
        let config = RatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.limiter,
            LimiterSpec::SlidingLog {
                max_requests: 10,
                window_secs: 60.0,
                resolution: Resolution::Fractional,
            }
        );
        assert_eq!(config.idle_ttl(), Some(std::time::Duration::from_secs(300)));
        assert_eq!(config.store.sweep_interval_secs, 15.0);
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let yaml = r#"
limiter:
  kind: token
  capacity: 5
  rate: 1
"#;
        let config = RatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.limiter.kind(), StrategyKind::Token);
    }

    #[test]
    fn test_parse_unknown_strategy_fails() {
        let yaml = r#"
limiter:
  kind: bogus
  max_requests: 5
"#;
        let err = RatekeeperConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RatekeeperError::Config(_)));
    }

    #[test]
    fn test_idle_ttl_out_of_range_disables_eviction() {
        let config = RatekeeperConfig::from_yaml("store:\n  idle_ttl_secs: 1.0e30\n").unwrap();
        assert_eq!(config.idle_ttl(), None);

        let config = RatekeeperConfig::from_yaml("store:\n  idle_ttl_secs: -5\n").unwrap();
        assert_eq!(config.idle_ttl(), None);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = RatekeeperConfig::load(Some(Path::new("/nonexistent/ratekeeper.yaml"))).unwrap_err();
        assert!(matches!(err, RatekeeperError::Config(_)));
    }

    #[test]
    fn test_load_layers_file_and_environment() {
        let path = std::env::temp_dir().join(format!("ratekeeper-layered-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "logging:\n  level: warn\nlimiter:\n  kind: fixed\n  max_requests: 5\n  window_secs: 5\n",
        )
        .unwrap();

        std::env::set_var("RATEKEEPER_LOGGING__LEVEL", "trace");
        let config = RatekeeperConfig::load(Some(path.as_path()));
        std::env::remove_var("RATEKEEPER_LOGGING__LEVEL");
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.limiter.kind(), StrategyKind::Fixed);
    }
}
