//! Tablewatch Configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal
//! config should just work - only specify what you need to change.
//!
//! There is no ambient global settings object: the embedding agent loads
//! one [`Config`] and threads the relevant sections into monitor, probe,
//! and state-store constructors.
//!
//! # Parsing
//!
//! ```
//! use tablewatch_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[warehouse]\ntoken = \"ya.29\"").unwrap();
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [log]
//! level = "info"
//! format = "console"
//!
//! [warehouse]
//! api_url = "https://warehouse.example.com/api/v2"
//! token = "bearer-token"
//! poll_interval_secs = 3
//! poll_timeout_secs = 300
//!
//! [analytical]
//! date_column = "d"
//! timestamp_column = "t"
//!
//! [monitor]
//! status_file = "var/status.json"
//! max_concurrent_cycles = 4
//! bucket_fanout = 4
//! ```

mod analytical;
mod error;
mod logging;
mod monitor;
mod validation;
mod warehouse;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use analytical::AnalyticalConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, init_logging};
pub use monitor::MonitorConfig;
pub use warehouse::WarehouseConfig;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Warehouse backend (HTTP API) settings
    pub warehouse: WarehouseConfig,

    /// Analytical-db backend settings
    pub analytical: AnalyticalConfig,

    /// Detection-cycle orchestration settings
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
