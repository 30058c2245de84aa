//! Strategy metrics
//!
//! Atomic counters for admission and completion, plus a rate-limited logger
//! for backpressure rejections. All counters use relaxed ordering: they are
//! eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backpressure::BackPressureReason;

/// Metrics for one processing strategy
///
/// # Thread Safety
///
/// All methods are safe to call from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct StrategyMetrics {
    /// Events admitted by the non-blocking or blocking check
    admitted: AtomicU64,

    /// Emissions refused because max concurrency was reached
    rejected_max_concurrency: AtomicU64,

    /// Emissions refused because a scheduler was saturated
    rejected_scheduler_busy: AtomicU64,

    /// Events completed successfully
    completed: AtomicU64,

    /// Events that failed in a stage
    failed: AtomicU64,

    /// Task submissions a scheduler refused (each retry counts)
    scheduler_rejections: AtomicU64,
}

impl StrategyMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            rejected_max_concurrency: AtomicU64::new(0),
            rejected_scheduler_busy: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            scheduler_rejections: AtomicU64::new(0),
        }
    }

    /// Record an admitted event
    #[inline]
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refused emission
    #[inline]
    pub fn record_rejected(&self, reason: BackPressureReason) {
        match reason {
            BackPressureReason::MaxConcurrencyExceeded => {
                self.rejected_max_concurrency.fetch_add(1, Ordering::Relaxed);
            }
            BackPressureReason::RequiredSchedulerBusy => {
                self.rejected_scheduler_busy.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a successfully processed event
    #[inline]
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed event
    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task submission refused by a scheduler
    #[inline]
    pub fn record_scheduler_rejection(&self) {
        self.scheduler_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    #[inline]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_max_concurrency: self.rejected_max_concurrency.load(Ordering::Relaxed),
            rejected_scheduler_busy: self.rejected_scheduler_busy.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            scheduler_rejections: self.scheduler_rejections.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.admitted.store(0, Ordering::Relaxed);
        self.rejected_max_concurrency.store(0, Ordering::Relaxed);
        self.rejected_scheduler_busy.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.scheduler_rejections.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`StrategyMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub rejected_max_concurrency: u64,
    pub rejected_scheduler_busy: u64,
    pub completed: u64,
    pub failed: u64,
    pub scheduler_rejections: u64,
}

impl MetricsSnapshot {
    /// Total refused emissions
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected_max_concurrency + self.rejected_scheduler_busy
    }

    /// Events admitted but not yet completed or failed
    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.admitted
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }

    /// Counter deltas since an earlier snapshot
    pub fn diff(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.saturating_sub(earlier.admitted),
            rejected_max_concurrency: self
                .rejected_max_concurrency
                .saturating_sub(earlier.rejected_max_concurrency),
            rejected_scheduler_busy: self
                .rejected_scheduler_busy
                .saturating_sub(earlier.rejected_scheduler_busy),
            completed: self.completed.saturating_sub(earlier.completed),
            failed: self.failed.saturating_sub(earlier.failed),
            scheduler_rejections: self
                .scheduler_rejections
                .saturating_sub(earlier.scheduler_rejections),
        }
    }
}

// =============================================================================
// Rate-limited backpressure logging
// =============================================================================

/// Aggregates backpressure rejections and logs at most once per interval
///
/// A saturated pipeline can refuse thousands of emissions per second; one
/// summary line per second replaces one line per refusal.
pub struct BackpressureTracker {
    /// Pipeline name for log fields
    pipeline: String,
    /// Max-concurrency refusals in current interval
    interval_max_concurrency: AtomicU64,
    /// Scheduler-busy refusals in current interval
    interval_scheduler_busy: AtomicU64,
    /// Last log time (epoch milliseconds)
    last_log_ms: AtomicU64,
}

/// Log interval in milliseconds
const LOG_INTERVAL_MS: u64 = 1000;
/// Refusals per interval above which the summary is logged at ERROR
const CRITICAL_REJECTION_THRESHOLD: u64 = 100;

impl BackpressureTracker {
    /// Create a new tracker
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            interval_max_concurrency: AtomicU64::new(0),
            interval_scheduler_busy: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(Self::now_ms()),
        }
    }

    /// Record a refusal and log if the interval elapsed
    ///
    /// Returns true if a log was emitted.
    pub fn record(&self, reason: BackPressureReason) -> bool {
        match reason {
            BackPressureReason::MaxConcurrencyExceeded => {
                self.interval_max_concurrency.fetch_add(1, Ordering::Relaxed);
            }
            BackPressureReason::RequiredSchedulerBusy => {
                self.interval_scheduler_busy.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.maybe_log()
    }

    fn maybe_log(&self) -> bool {
        let now = Self::now_ms();
        let last = self.last_log_ms.load(Ordering::Relaxed);

        if now.saturating_sub(last) < LOG_INTERVAL_MS {
            return false;
        }

        // Claim the log slot; concurrent callers back off
        if self
            .last_log_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let max_concurrency = self.interval_max_concurrency.swap(0, Ordering::Relaxed);
        let scheduler_busy = self.interval_scheduler_busy.swap(0, Ordering::Relaxed);
        let total = max_concurrency + scheduler_busy;

        if total == 0 {
            return false;
        }

        if total > CRITICAL_REJECTION_THRESHOLD {
            tracing::error!(
                pipeline = %self.pipeline,
                max_concurrency_exceeded = max_concurrency,
                required_scheduler_busy = scheduler_busy,
                threshold = CRITICAL_REJECTION_THRESHOLD,
                "CRITICAL: sustained backpressure - pipeline cannot keep up"
            );
        } else {
            tracing::warn!(
                pipeline = %self.pipeline,
                max_concurrency_exceeded = max_concurrency,
                required_scheduler_busy = scheduler_busy,
                "backpressure: events refused in last second"
            );
        }

        true
    }

    #[inline]
    fn now_ms() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Refusals recorded in the current interval
    #[cfg(test)]
    fn current_rejections(&self) -> u64 {
        self.interval_max_concurrency.load(Ordering::Relaxed)
            + self.interval_scheduler_busy.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BackpressureTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureTracker")
            .field("pipeline", &self.pipeline)
            .field(
                "interval_max_concurrency",
                &self.interval_max_concurrency.load(Ordering::Relaxed),
            )
            .field(
                "interval_scheduler_busy",
                &self.interval_scheduler_busy.load(Ordering::Relaxed),
            )
            .finish()
    }
}
