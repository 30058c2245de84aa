//! Strategy error types
//!
//! Backpressure is not an error: it is reported as
//! `Option<BackPressureReason>`. Everything here is a real failure.

use thiserror::Error;
use weir_config::ConfigError;
use weir_scheduler::SchedulerError;

use crate::stage::StageError;

/// Strategy errors
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Invalid tunable
    #[error("invalid strategy configuration: {0}")]
    Config(#[from] ConfigError),

    /// Sink or provider used after `dispose()`
    #[error("sink '{name}' is closed")]
    SinkClosed {
        /// Sink or provider name
        name: String,
    },

    /// A per-thread sink supplier failed
    #[error("invalid state in '{component}': {message}")]
    InvalidState {
        /// Component that failed
        component: String,
        /// Supplier failure
        message: String,
    },

    /// A user stage failed; propagated unchanged
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Scheduler acquisition or submission failed
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A collaborator could not be resolved when the strategy was initialised
    #[error("strategy for pipeline '{pipeline}' is misconfigured: {message}")]
    Configuration {
        /// Owning pipeline
        pipeline: String,
        /// What could not be resolved
        message: String,
    },

    /// A transactional event reached an asynchronous strategy
    #[error("Unable to process a transactional flow asynchronously (event {event_id})")]
    Transactional {
        /// Rejected event
        event_id: u64,
    },

    /// Strategy was stopped and not restarted
    #[error("strategy for pipeline '{pipeline}' is not started")]
    NotStarted {
        /// Owning pipeline
        pipeline: String,
    },
}

impl StrategyError {
    /// Create a SinkClosed error
    pub fn closed(name: impl Into<String>) -> Self {
        Self::SinkClosed { name: name.into() }
    }

    /// Create an InvalidState error
    pub fn invalid_state(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a Configuration error
    pub fn configuration(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }

    /// True for the "closed" error raised after disposal
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::SinkClosed { .. })
    }
}

/// Result type for strategy operations
pub type Result<T> = std::result::Result<T, StrategyError>;
