//! Admission control
//!
//! One atomic in-flight counter per strategy. An admitted event registers a
//! completion hook that decrements the counter, so capacity comes back only
//! when events finish, never on a timer.
//!
//! States:
//! - `OPEN`: in-flight < max
//! - `SATURATED`: in-flight >= max (only enforced at emission with eager check)
//!
//! Independently of the counter, a scheduler that refused work raises the
//! busy flag; it stays up until the next successful submission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::metrics::{BackpressureTracker, StrategyMetrics};

/// How long a blocked `check_accepting` waits before re-checking the busy flag
const ACCEPT_RECHECK_INTERVAL: Duration = Duration::from_millis(10);

struct Inner {
    pipeline: String,
    in_flight: AtomicUsize,
    max_concurrency: Option<usize>,
    eager_check: bool,
    scheduler_busy: AtomicBool,
    closed: AtomicBool,
    /// Pairs with `released`; guards no data
    gate: Mutex<()>,
    released: Condvar,
    metrics: Arc<StrategyMetrics>,
    tracker: BackpressureTracker,
}

/// Shared admission controller
#[derive(Clone)]
pub struct Admission {
    inner: Arc<Inner>,
}

impl Admission {
    /// Create a controller
    pub fn new(
        pipeline: impl Into<String>,
        max_concurrency: Option<usize>,
        eager_check: bool,
        metrics: Arc<StrategyMetrics>,
    ) -> Self {
        let pipeline = pipeline.into();
        Self {
            inner: Arc::new(Inner {
                tracker: BackpressureTracker::new(pipeline.clone()),
                pipeline,
                in_flight: AtomicUsize::new(0),
                max_concurrency,
                eager_check,
                scheduler_busy: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                gate: Mutex::new(()),
                released: Condvar::new(),
                metrics,
            }),
        }
    }

    /// Non-blocking admission
    ///
    /// Returns `None` when the event was admitted; its completion hook will
    /// release the slot.
    pub fn check_emitting(&self, event: &Event) -> Option<BackPressureReason> {
        let inner = &self.inner;

        if inner.scheduler_busy.load(Ordering::SeqCst) {
            return self.refuse(BackPressureReason::RequiredSchedulerBusy);
        }

        let in_flight = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if inner.eager_check
            && let Some(max) = inner.max_concurrency
            && in_flight > max
        {
            self.release();
            return self.refuse(BackPressureReason::MaxConcurrencyExceeded);
        }

        self.track(event);
        None
    }

    /// Blocking admission
    ///
    /// Waits while the scheduler is busy or the maximum is reached. Returns
    /// once the event holds a slot.
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::SinkClosed` if the controller is closed while
    /// waiting.
    pub fn check_accepting(&self, event: &Event) -> Result<()> {
        let inner = &self.inner;

        loop {
            if inner.closed.load(Ordering::SeqCst) {
                return Err(StrategyError::closed(inner.pipeline.as_str()));
            }

            if !inner.scheduler_busy.load(Ordering::SeqCst) && self.try_acquire() {
                self.track(event);
                return Ok(());
            }

            let mut gate = inner.gate.lock();
            // Re-check under the gate so a release between the attempt and
            // the wait is not missed
            if inner.closed.load(Ordering::SeqCst) || self.has_capacity() {
                continue;
            }
            inner
                .released
                .wait_for(&mut gate, ACCEPT_RECHECK_INTERVAL);
        }
    }

    /// A scheduler refused work: report busy until the next successful submission
    pub fn on_rejected(&self, scheduler: &str) {
        self.inner.metrics.record_scheduler_rejection();
        if !self.inner.scheduler_busy.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                pipeline = %self.inner.pipeline,
                scheduler,
                "scheduler saturated, refusing emissions"
            );
        }
    }

    /// A submission succeeded: clear the busy flag
    pub fn on_scheduled(&self) {
        if self.inner.scheduler_busy.swap(false, Ordering::SeqCst) {
            tracing::debug!(pipeline = %self.inner.pipeline, "scheduler accepting again");
            self.notify();
        }
    }

    /// Wake and fail every blocked `check_accepting`; further calls fail too
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Events currently holding a slot
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// True while the busy flag is raised
    #[inline]
    pub fn is_scheduler_busy(&self) -> bool {
        self.inner.scheduler_busy.load(Ordering::SeqCst)
    }

    /// Configured maximum
    #[inline]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.inner.max_concurrency
    }

    fn has_capacity(&self) -> bool {
        let inner = &self.inner;
        !inner.scheduler_busy.load(Ordering::SeqCst)
            && inner
                .max_concurrency
                .is_none_or(|max| inner.in_flight.load(Ordering::SeqCst) < max)
    }

    /// CAS loop so blocking admission never overshoots the maximum
    fn try_acquire(&self) -> bool {
        let inner = &self.inner;
        let Some(max) = inner.max_concurrency else {
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            return true;
        };

        let mut current = inner.in_flight.load(Ordering::SeqCst);
        while current < max {
            match inner.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn track(&self, event: &Event) {
        self.inner.metrics.record_admitted();
        let admission = self.clone();
        event.context().on_complete(move |_| admission.release());
    }

    fn release(&self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.notify();
    }

    fn notify(&self) {
        let _gate = self.inner.gate.lock();
        self.inner.released.notify_all();
    }

    fn refuse(&self, reason: BackPressureReason) -> Option<BackPressureReason> {
        self.inner.metrics.record_rejected(reason);
        self.inner.tracker.record(reason);
        Some(reason)
    }
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("pipeline", &self.inner.pipeline)
            .field("in_flight", &self.in_flight())
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("eager_check", &self.inner.eager_check)
            .field("scheduler_busy", &self.is_scheduler_busy())
            .finish()
    }
}

#[cfg(test)]
#[path = "admission_test.rs"]
mod tests;
