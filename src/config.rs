//! Configuration management for Tollgate.
//!
//! Values are layered, lowest priority first: built-in defaults, an optional
//! YAML file, then `TOLLGATE__*` environment variables
//! (e.g. `TOLLGATE__LIMITER__CAPACITY=500`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Result, TollgateError};
use crate::ratelimit::Limiter;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Directory files are served from
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            root_dir: default_root_dir(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8686))
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum number of distinct identifiers tracked at once
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Window length in seconds
    #[serde(default = "default_reset_cycle")]
    pub reset_cycle_secs: u64,

    /// Tokens granted per window
    #[serde(default = "default_reset_tokens")]
    pub reset_tokens: u64,

    /// Interval between expired-bucket sweeps in seconds, 0 disables sweeping
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            reset_cycle_secs: default_reset_cycle(),
            reset_tokens: default_reset_tokens(),
            sweep_interval_secs: 0,
        }
    }
}

fn default_capacity() -> usize {
    10000
}

fn default_reset_cycle() -> u64 {
    60
}

fn default_reset_tokens() -> u64 {
    30
}

impl LimiterConfig {
    /// Build a limiter from this configuration.
    pub fn build(&self) -> Result<Limiter> {
        Limiter::new(self.capacity, self.reset_cycle_secs, self.reset_tokens)
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Layer defaults, an optional YAML file and `TOLLGATE__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("TOLLGATE").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
