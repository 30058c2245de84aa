//! Bounded drain on disposal
//!
//! Disposal waits for ingress handles to finish, bounded by the pipeline's
//! shutdown timeout:
//! - non-positive timeout: do not wait
//! - cancellation token fired: stop waiting at once
//! - timeout elapsed: stop waiting
//!
//! None of these raise an error. Every incomplete drain is reported once to
//! [`DrainDiagnostics`]; a clean drain reports nothing.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// How long disposal may wait for in-flight work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeout(Option<Duration>);

impl ShutdownTimeout {
    /// Return immediately without waiting
    pub const IMMEDIATE: ShutdownTimeout = ShutdownTimeout(None);

    /// From milliseconds; zero or negative means "do not wait"
    pub fn from_millis(millis: i64) -> Self {
        if millis <= 0 {
            Self::IMMEDIATE
        } else {
            Self(Some(Duration::from_millis(millis.unsigned_abs())))
        }
    }

    /// From a duration; zero means "do not wait"
    pub fn from_duration(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::IMMEDIATE
        } else {
            Self(Some(duration))
        }
    }

    /// Wait budget, `None` when immediate
    #[inline]
    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    /// True for the "do not wait" setting
    #[inline]
    pub fn is_immediate(&self) -> bool {
        self.0.is_none()
    }
}

impl From<Duration> for ShutdownTimeout {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

/// Result of a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every handle finished
    Drained,
    /// Non-positive timeout; returned without waiting
    Skipped { remaining: usize },
    /// Timeout elapsed first
    TimedOut { remaining: usize },
    /// Wait abandoned through cancellation
    Interrupted { remaining: usize },
}

impl DrainOutcome {
    /// True for `Drained`
    #[inline]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Drained)
    }

    /// Handles still active when the drain returned
    pub fn remaining(&self) -> usize {
        match self {
            Self::Drained => 0,
            Self::Skipped { remaining }
            | Self::TimedOut { remaining }
            | Self::Interrupted { remaining } => *remaining,
        }
    }

    /// Combine two outcomes; interruption dominates, then timeout, then skip
    pub fn merge(self, other: DrainOutcome) -> DrainOutcome {
        let remaining = self.remaining() + other.remaining();
        match (self, other) {
            (Self::Interrupted { .. }, _) | (_, Self::Interrupted { .. }) => {
                Self::Interrupted { remaining }
            }
            (Self::TimedOut { .. }, _) | (_, Self::TimedOut { .. }) => Self::TimedOut { remaining },
            (Self::Skipped { .. }, _) | (_, Self::Skipped { .. }) => Self::Skipped { remaining },
            (Self::Drained, Self::Drained) => Self::Drained,
        }
    }
}

impl fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => f.write_str("drained"),
            Self::Skipped { remaining } => write!(f, "skipped with {} active", remaining),
            Self::TimedOut { remaining } => write!(f, "timed out with {} active", remaining),
            Self::Interrupted { remaining } => {
                write!(f, "interrupted with {} active", remaining)
            }
        }
    }
}

/// Receives incomplete drains
pub trait DrainDiagnostics: Send + Sync {
    /// Called once per incomplete drain, never for a clean one
    fn incomplete_drain(&self, pipeline: &str, component: &str, outcome: &DrainOutcome);
}

/// Reports incomplete drains as warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DrainDiagnostics for TracingDiagnostics {
    fn incomplete_drain(&self, pipeline: &str, component: &str, outcome: &DrainOutcome) {
        match outcome {
            DrainOutcome::Drained => {}
            DrainOutcome::Skipped { remaining } => tracing::warn!(
                pipeline,
                component,
                active_handles = remaining,
                "shutdown timeout is not positive; disposing without waiting for in-flight events"
            ),
            DrainOutcome::TimedOut { remaining } => tracing::warn!(
                pipeline,
                component,
                active_handles = remaining,
                "shutdown timeout elapsed before in-flight events completed"
            ),
            DrainOutcome::Interrupted { remaining } => tracing::warn!(
                pipeline,
                component,
                active_handles = remaining,
                "interrupted while waiting for in-flight events to complete"
            ),
        }
    }
}

/// Drain settings for one pipeline
#[derive(Clone)]
pub struct Drainer {
    pipeline: String,
    timeout: ShutdownTimeout,
    poll_interval: Duration,
    cancel: CancellationToken,
    diagnostics: Arc<dyn DrainDiagnostics>,
}

impl Drainer {
    /// Create a drainer
    pub fn new(
        pipeline: impl Into<String>,
        timeout: ShutdownTimeout,
        poll_interval: Duration,
        cancel: CancellationToken,
        diagnostics: Arc<dyn DrainDiagnostics>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            cancel,
            diagnostics,
        }
    }

    /// Shutdown timeout in effect
    #[inline]
    pub fn timeout(&self) -> ShutdownTimeout {
        self.timeout
    }

    /// Poll `active` until it reaches zero, the timeout elapses, or the
    /// token is cancelled
    ///
    /// `active` must be monotonically non-increasing once the caller has
    /// stopped creating handles.
    ///
    /// A non-positive timeout with nothing active is a clean drain: it
    /// returns `Drained` and reports no diagnostic.
    pub fn drain(&self, component: &str, active: impl Fn() -> usize) -> DrainOutcome {
        let outcome = self.wait(&active);
        if !outcome.is_clean() {
            self.diagnostics
                .incomplete_drain(&self.pipeline, component, &outcome);
        } else {
            tracing::debug!(pipeline = %self.pipeline, component, "drained");
        }
        outcome
    }

    fn wait(&self, active: &impl Fn() -> usize) -> DrainOutcome {
        let Some(budget) = self.timeout.duration() else {
            return match active() {
                0 => DrainOutcome::Drained,
                remaining => DrainOutcome::Skipped { remaining },
            };
        };

        let deadline = Instant::now() + budget;
        loop {
            let remaining = active();
            if remaining == 0 {
                return DrainOutcome::Drained;
            }
            if self.cancel.is_cancelled() {
                return DrainOutcome::Interrupted { remaining };
            }

            let now = Instant::now();
            if now >= deadline {
                return DrainOutcome::TimedOut { remaining };
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

impl fmt::Debug for Drainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drainer")
            .field("pipeline", &self.pipeline)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "drain_test.rs"]
mod tests;
