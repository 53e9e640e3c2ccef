//! Configuration file parsing and structures.
//!
//! thingsync uses TOML for declarative configuration. Every section is optional
//! so an empty file (or no file at all) yields a working adapter listening on
//! the standard SSDP group.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

use crate::adapter::ssdp::{SSDP_MCAST_V4, SSDP_PORT};

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"thingsync::adapter::ssdp" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Render the level and overrides as an `EnvFilter` directive string.
    pub fn filter_directives(&self) -> String {
        let level = LevelFilter::from(self.level);
        let mut overrides: Vec<_> = self.overrides.iter().collect();
        overrides.sort();

        let mut directives = vec![level.to_string().to_lowercase()];
        for (target, level) in overrides {
            directives.push(format!(
                "{}={}",
                target,
                LevelFilter::from(*level).to_string().to_lowercase()
            ));
        }
        directives.join(",")
    }
}

fn default_adapter_name() -> String {
    "GenericSSDPAdapter".to_string()
}

/// Adapter identity and reconciliation policy
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Adapter name, used as the prefix of every device id (`<name>:<n>`)
    #[serde(default = "default_adapter_name")]
    pub name: String,

    /// Drop a reconciliation value for the requesting property when that
    /// property was written locally after the request was issued.
    #[serde(default)]
    pub discard_stale_reconciliation: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: default_adapter_name(),
            discard_stale_reconciliation: false,
        }
    }
}

fn default_multicast_group() -> Ipv4Addr {
    SSDP_MCAST_V4
}

fn default_port() -> u16 {
    SSDP_PORT
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_pairing_timeout_secs() -> u64 {
    60
}

/// SSDP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface address used to join the multicast group
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,

    /// Nominal pairing window; the listener itself runs for half of it
    #[serde(default = "default_pairing_timeout_secs")]
    pub pairing_timeout_secs: u64,
}

impl DiscoveryConfig {
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            port: default_port(),
            interface: default_interface(),
            pairing_timeout_secs: default_pairing_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// Local HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
