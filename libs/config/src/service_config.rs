//! Service Configuration Module
//!
//! Layered configuration for the price service and the relay worker. Sources
//! are applied in order, later ones winning:
//!
//! 1. built-in defaults ([`crate::defaults`])
//! 2. the base TOML file
//! 3. `environments/<env>.toml` next to the base file, when present
//! 4. `PRICEWIRE_`-prefixed environment variables, `__` between path segments
//!    (`PRICEWIRE_RELAY__MAX_ATTEMPTS=3`)

use crate::defaults;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ENV_PREFIX: &str = "PRICEWIRE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config_crate::ConfigError),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to expand {field}: {message}")]
    Expand { field: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main service configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub gossip: GossipConfig,
    pub listener: ListenerConfig,
    pub readiness: ReadinessConfig,
    pub distribution: DistributionConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GossipConfig {
    /// WebSocket URL of the gossip stream; `$VARS` are expanded
    pub endpoint: String,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::gossip::ENDPOINT.to_string(),
            reconnect_delay_ms: defaults::gossip::RECONNECT_DELAY_MS,
            max_reconnect_delay_ms: defaults::gossip::MAX_RECONNECT_DELAY_MS,
            jitter_ms: defaults::gossip::JITTER_MS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    pub dedup_capacity: usize,
    pub dedup_ttl_secs: u64,
    pub ignore_older_than_secs: u64,
    pub history_ttl_secs: u64,
    pub history_cleanup_interval_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: defaults::listener::DEDUP_CAPACITY,
            dedup_ttl_secs: defaults::listener::DEDUP_TTL_SECS,
            ignore_older_than_secs: defaults::listener::IGNORE_OLDER_THAN_SECS,
            history_ttl_secs: defaults::listener::HISTORY_TTL_SECS,
            history_cleanup_interval_secs: defaults::listener::HISTORY_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl ListenerConfig {
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    /// `None` when the age filter is disabled
    pub fn ignore_older_than(&self) -> Option<Duration> {
        (self.ignore_older_than_secs > 0).then(|| Duration::from_secs(self.ignore_older_than_secs))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    pub warmup_secs: u64,
    pub min_feed_count: usize,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            warmup_secs: defaults::readiness::WARMUP_SECS,
            min_feed_count: defaults::readiness::MIN_FEED_COUNT,
        }
    }
}

impl ReadinessConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DistributionConfig {
    pub bind_address: String,
    pub port: u16,
    pub heartbeat_interval_secs: u64,
    pub max_payload_bytes: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::distribution::BIND_ADDRESS.to_string(),
            port: defaults::distribution::PORT,
            heartbeat_interval_secs: defaults::distribution::HEARTBEAT_INTERVAL_SECS,
            max_payload_bytes: defaults::distribution::MAX_PAYLOAD_BYTES,
        }
    }
}

impl DistributionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub max_batch_size: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub balance_query_interval_ms: u64,
    pub max_healthy_no_relay_secs: u64,
    pub idle_wait_ms: u64,
    pub status_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_batch_size: defaults::relay::MAX_BATCH_SIZE,
            max_attempts: defaults::relay::MAX_ATTEMPTS,
            retry_base_delay_ms: defaults::relay::RETRY_BASE_DELAY_MS,
            balance_query_interval_ms: defaults::relay::BALANCE_QUERY_INTERVAL_MS,
            max_healthy_no_relay_secs: defaults::relay::MAX_HEALTHY_NO_RELAY_SECS,
            idle_wait_ms: defaults::relay::IDLE_WAIT_MS,
            status_port: defaults::relay::STATUS_PORT,
        }
    }
}

impl RelayConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// `None` when only the startup balance query runs
    pub fn balance_query_interval(&self) -> Option<Duration> {
        (self.balance_query_interval_ms > 0)
            .then(|| Duration::from_millis(self.balance_query_interval_ms))
    }

    pub fn max_healthy_no_relay(&self) -> Duration {
        Duration::from_secs(self.max_healthy_no_relay_secs)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        Self::load_with_vars(base_path, environment, None)
    }

    /// Same as [`ServiceConfig::load`], reading variables from `vars`
    /// instead of the process environment when given
    pub fn load_with_vars(
        base_path: Option<&Path>,
        environment: Option<&str>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(base) = base_path {
            info!("Loading configuration from {:?}", base);
            builder = builder.add_source(File::from(base).required(true));

            if let Some(env) = environment {
                let env_file = base
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
                    .join("environments")
                    .join(format!("{}.toml", env));
                builder = add_environment_file(builder, env_file);
            }
        } else {
            debug!("No configuration file given, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        let mut config: ServiceConfig = builder.build()?.try_deserialize()?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the gossip endpoint
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded =
            shellexpand::env(&self.gossip.endpoint).map_err(|e| ConfigError::Expand {
                field: "gossip.endpoint",
                message: e.to_string(),
            })?;
        self.gossip.endpoint = expanded.into_owned();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        fn non_zero(field: &'static str, value: u64) -> Result<()> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        non_zero("relay.max_batch_size", self.relay.max_batch_size as u64)?;
        non_zero("relay.max_attempts", self.relay.max_attempts as u64)?;
        non_zero(
            "relay.max_healthy_no_relay_secs",
            self.relay.max_healthy_no_relay_secs,
        )?;
        non_zero("listener.dedup_capacity", self.listener.dedup_capacity as u64)?;
        non_zero(
            "distribution.heartbeat_interval_secs",
            self.distribution.heartbeat_interval_secs,
        )?;

        if self.gossip.max_reconnect_delay_ms < self.gossip.reconnect_delay_ms {
            return Err(ConfigError::Invalid {
                field: "gossip.max_reconnect_delay_ms",
                reason: format!(
                    "{} is below reconnect_delay_ms {}",
                    self.gossip.max_reconnect_delay_ms, self.gossip.reconnect_delay_ms
                ),
            });
        }
        Ok(())
    }

    /// Render as TOML, e.g. for `--print-config`
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn add_environment_file(
    builder: config_crate::ConfigBuilder<config_crate::builder::DefaultState>,
    env_file: PathBuf,
) -> config_crate::ConfigBuilder<config_crate::builder::DefaultState> {
    if env_file.exists() {
        info!("Loading environment config: {:?}", env_file);
        builder.add_source(File::from(env_file))
    } else {
        warn!("Environment config not found: {:?}", env_file);
        builder
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>, environment: Option<&str>) -> Result<ServiceConfig> {
    ServiceConfig::load(path, environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn no_vars() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::load_with_vars(None, None, no_vars()).unwrap();
        assert_eq!(config.listener.dedup_capacity, 10_000);
        assert_eq!(config.listener.dedup_ttl_secs, 60);
        assert_eq!(config.readiness.warmup_secs, 30);
        assert_eq!(config.distribution.heartbeat_interval_secs, 30);
        assert_eq!(config.distribution.max_payload_bytes, 102_400);
        assert_eq!(config.relay.max_batch_size, 1);
        assert_eq!(config.relay.max_attempts, 2);
        assert_eq!(config.relay.max_healthy_no_relay_secs, 120);
        assert_eq!(config.relay.balance_query_interval(), None);
    }

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pricewire.toml");

        let config_content = r#"
[gossip]
endpoint = "ws://spy:7073"

[relay]
max_attempts = 4
retry_base_delay_ms = 250

[distribution]
port = 9000
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = ServiceConfig::load_with_vars(Some(&config_path), None, no_vars()).unwrap();
        assert_eq!(config.gossip.endpoint, "ws://spy:7073");
        assert_eq!(config.relay.max_attempts, 4);
        assert_eq!(config.relay.retry_base_delay(), Duration::from_millis(250));
        assert_eq!(config.distribution.port, 9000);
        // untouched sections keep defaults
        assert_eq!(config.listener, ListenerConfig::default());
    }

    #[test]
    fn test_environment_file_and_variable_overrides() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pricewire.toml");
        fs::write(&config_path, "[relay]\nmax_attempts = 4\nmax_batch_size = 2\n").unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(
            dir.path().join("environments").join("staging.toml"),
            "[relay]\nmax_attempts = 6\n",
        )
        .unwrap();

        let vars = HashMap::from([(
            "PRICEWIRE_RELAY__MAX_BATCH_SIZE".to_string(),
            "8".to_string(),
        )]);
        let config =
            ServiceConfig::load_with_vars(Some(&config_path), Some("staging"), Some(vars)).unwrap();
        assert_eq!(config.relay.max_attempts, 6);
        assert_eq!(config.relay.max_batch_size, 8);
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let vars = HashMap::from([(
            "PRICEWIRE_RELAY__MAX_ATTEMPTS".to_string(),
            "0".to_string(),
        )]);
        let err = ServiceConfig::load_with_vars(None, None, Some(vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "relay.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_rejects_zero_fields() {
        let mut config = ServiceConfig::default();
        config.listener.dedup_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.distribution.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.gossip.max_reconnect_delay_ms = 10;
        assert!(config.validate().is_err());

        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ignore_older_than_zero_disables() {
        let mut listener = ListenerConfig::default();
        assert_eq!(listener.ignore_older_than(), Some(Duration::from_secs(300)));
        listener.ignore_older_than_secs = 0;
        assert_eq!(listener.ignore_older_than(), None);
    }

    #[test]
    fn test_renders_toml() {
        let rendered = ServiceConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[relay]"));
        assert!(rendered.contains("max_attempts = 2"));
    }
}
