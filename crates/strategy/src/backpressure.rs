//! Backpressure reasons
//!
//! Acceptance is the absence of a reason: admission checks return
//! `Option<BackPressureReason>` and `None` means the event was admitted.

use std::fmt;

/// Why an event was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackPressureReason {
    /// The in-flight counter would exceed the configured maximum
    MaxConcurrencyExceeded,
    /// A scheduler this strategy depends on signalled saturation
    RequiredSchedulerBusy,
}

impl BackPressureReason {
    /// Stable name for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxConcurrencyExceeded => "max_concurrency_exceeded",
            Self::RequiredSchedulerBusy => "required_scheduler_busy",
        }
    }
}

impl fmt::Display for BackPressureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
