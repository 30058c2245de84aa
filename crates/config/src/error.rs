//! Configuration errors
//!
//! Every tunable is checked when the config is loaded or a factory setter
//! is called; nothing is deferred to strategy start.

use std::io;
use thiserror::Error;

/// Result alias for config loading and validation
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Why a configuration was refused
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("cannot read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A buffer size that must be a power of two
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: usize },

    /// A tunable outside its allowed range
    #[error("invalid {field} for {component} '{name}': {message}")]
    InvalidValue {
        /// Section the value belongs to, e.g. "strategy" or "scheduler"
        component: &'static str,
        /// Strategy type or pool name
        name: String,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Create a NotPowerOfTwo error
    pub fn not_power_of_two(field: &'static str, value: usize) -> Self {
        Self::NotPowerOfTwo { field, value }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }
}
