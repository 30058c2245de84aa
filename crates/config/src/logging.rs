//! Logging configuration
//!
//! A base level plus optional per-target overrides, rendered as one
//! `EnvFilter` directive by [`LogConfig::directive`].

use std::collections::BTreeMap;

use serde::Deserialize;

/// Verbosity of a log target
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    /// Scheduler acquisition, sink creation, handle lifecycle
    Debug,
    #[default]
    Info,
    /// Incomplete drains and backpressure bursts
    Warn,
    Error,
}

impl LogLevel {
    /// Name accepted by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log line encoding
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event with thread names
    #[default]
    Console,
    /// One JSON object per line
    Json,
}

/// Logging configuration
///
/// # Example
///
/// ```toml
/// [log]
/// level = "info"
/// format = "json"
///
/// [log.targets]
/// "weir_strategy::ingress" = "trace"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level for every target
    /// Default: info
    pub level: LogLevel,

    /// Default: console
    pub format: LogFormat,

    /// Per-target levels layered over the base level
    pub targets: BTreeMap<String, LogLevel>,
}

impl LogConfig {
    /// Filter directive, e.g. `info,weir_strategy::ingress=trace`
    ///
    /// `base` replaces the configured base level when given (command-line
    /// override); target overrides still apply.
    pub fn directive(&self, base: Option<&str>) -> String {
        let mut directive = base.unwrap_or(self.level.as_str()).to_string();
        for (target, level) in &self.targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level.as_str());
        }
        directive
    }
}
