//! Scheduler error types

use std::fmt;

use thiserror::Error;

use crate::Task;

/// Result type for scheduler acquisition
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while building or acquiring schedulers
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A worker thread could not be spawned
    #[error("failed to spawn worker for scheduler '{scheduler}': {source}")]
    Spawn {
        /// Scheduler name
        scheduler: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The provider cannot supply the requested scheduler
    #[error("scheduler '{scheduler}' is unavailable: {reason}")]
    Unavailable {
        /// Scheduler name
        scheduler: String,
        /// Why it cannot be supplied
        reason: String,
    },

    /// The scheduler has been stopped
    #[error("scheduler '{0}' is stopped")]
    Stopped(String),
}

impl SchedulerError {
    /// Create an Unavailable error
    pub fn unavailable(scheduler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            scheduler: scheduler.into(),
            reason: reason.into(),
        }
    }
}

/// Failed submission; hands the task back to the caller
///
/// Mirrors a channel's `TrySendError`: the caller decides whether to retry,
/// run the task elsewhere, or drop it.
pub enum SubmitError {
    /// Queue is full, retry later
    Rejected(Task),
    /// Scheduler is stopped, no retry will succeed
    Stopped(Task),
}

impl SubmitError {
    /// Recover the task that was not scheduled
    pub fn into_task(self) -> Task {
        match self {
            Self::Rejected(task) | Self::Stopped(task) => task,
        }
    }

    /// True when a later retry may succeed
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(_) => f.write_str("Rejected(..)"),
            Self::Stopped(_) => f.write_str("Stopped(..)"),
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(_) => f.write_str("task rejected: scheduler queue is full"),
            Self::Stopped(_) => f.write_str("task rejected: scheduler is stopped"),
        }
    }
}

impl std::error::Error for SubmitError {}
