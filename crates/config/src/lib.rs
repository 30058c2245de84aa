//! Weir Configuration
//!
//! TOML-based configuration for processing strategies and the thread pools
//! they run on. An empty file is a valid config: every section has defaults.
//!
//! Parsing validates, so a `Config` that exists is usable:
//!
//! ```
//! use weir_config::{Config, StrategyKind};
//!
//! let config: Config = "[strategy]\ntype = \"direct\"".parse().unwrap();
//! assert_eq!(config.strategy.kind, StrategyKind::Direct);
//! ```
//!
//! # weir.toml
//!
//! ```toml
//! [strategy]
//! type = "emitter"
//! buffer_size = 256
//! max_concurrency = 64
//! shutdown_timeout = "5s"
//!
//! [schedulers]
//! artifact = "orders-app"
//!
//! [log]
//! level = "info"
//! ```

mod error;
mod logging;
mod schedulers;
mod strategy;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use schedulers::{PoolConfig, SchedulersConfig};
pub use strategy::{DEFAULT_BUFFER_SIZE, DEFAULT_SUBSCRIBER_COUNT, StrategyConfig, StrategyKind};
pub use validation::validate_strategy;

use serde::Deserialize;

/// Root of `weir.toml`; every section may be omitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[strategy]`: family and tunables
    pub strategy: StrategyConfig,

    /// `[schedulers]`: artifact name and pool sizing
    pub schedulers: SchedulersConfig,

    /// `[log]`
    pub log: LogConfig,
}

impl Config {
    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// `ConfigError::Read` if the file cannot be read, otherwise whatever
    /// [`Config::from_str`] reports.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Check every section; parsing already calls this
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

/// Parses and validates; a config that parses is ready to use
impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
