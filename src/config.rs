//! Configuration management for Storeguard.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::promo::DEFAULT_HISTORY_LIMIT;

/// Prefix for environment overrides, e.g. `STOREGUARD__LOGIN__MAX_ATTEMPTS=10`.
const ENV_PREFIX: &str = "STOREGUARD";

/// Main configuration for the Storeguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreguardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Login throttling configuration
    #[serde(default)]
    pub login: LoginThrottleConfig,

    /// Promo code configuration
    #[serde(default)]
    pub promo: PromoConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Login throttling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginThrottleConfig {
    /// Attempts allowed per window before further attempts are rejected
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often expired entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl LoginThrottleConfig {
    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// The sweep interval as a [`Duration`], never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for LoginThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval() -> u64 {
    5 * 60
}

/// Promo code configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoConfig {
    /// YAML catalog of codes loaded at start-up
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// JSON Lines file every redemption is appended to and replayed from
    #[serde(default)]
    pub redemption_log_path: Option<String>,

    /// Redemptions kept in memory for listing
    #[serde(default = "default_history_limit")]
    pub redemption_history_limit: usize,
}

impl Default for PromoConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            redemption_log_path: None,
            redemption_history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
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

impl StoreguardConfig {
    /// Load configuration from an optional file, layered under
    /// `STOREGUARD__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
