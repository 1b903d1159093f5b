//! # Pricewire Configuration
//!
//! Configuration loading and defaults shared by the price service and the
//! relay worker.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use config::ServiceConfig;
//! use std::path::Path;
//!
//! let config = ServiceConfig::load(Some(Path::new("config/pricewire.toml")), Some("staging"))?;
//! println!("relaying with {} attempts", config.relay.max_attempts);
//! # Ok::<(), config::ConfigError>(())
//! ```

pub mod defaults;
pub mod service_config;

pub use service_config::{
    load_config, ConfigError, DistributionConfig, GossipConfig, ListenerConfig, ReadinessConfig,
    RelayConfig, Result, ServiceConfig, ENV_PREFIX,
};
