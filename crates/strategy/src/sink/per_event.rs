//! Per-event stream sink

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use weir_scheduler::{SchedulerError, SubmitError, Task};

use super::{ActiveGuard, Availability, EventSink, execute, reject_transactional};
use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::ingress::HandleContext;

/// Runs each event as an independent one-shot pass over the stage
///
/// `accept` runs the pass on the calling thread. `emit` hands it to the
/// light scheduler and returns. Wrapped stages hop to their own schedulers
/// either way.
///
/// `emit` always reports acceptance: limits are enforced by the strategy's
/// admission check before the sink is reached. A refusing light scheduler
/// fails the event and flags the strategy busy, so the next admission
/// check reports `RequiredSchedulerBusy`.
pub struct PerEventSink {
    name: String,
    ctx: HandleContext,
    availability: Arc<Availability>,
    /// Emitted passes not yet finished, shared with the strategy's drain
    in_flight: Arc<AtomicUsize>,
    disposed: AtomicBool,
}

impl PerEventSink {
    pub(crate) fn new(
        name: impl Into<String>,
        ctx: HandleContext,
        availability: Arc<Availability>,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            name: name.into(),
            ctx,
            availability,
            in_flight,
            disposed: AtomicBool::new(false),
        }
    }

    fn check(&self, event: &Event) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StrategyError::closed(self.name.as_str()));
        }
        self.availability.check()?;
        reject_transactional(event)
    }
}

impl EventSink for PerEventSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, event: Event) -> Result<()> {
        self.check(&event)?;
        execute(self.ctx.stage.as_ref(), event, &self.ctx.metrics)?;
        Ok(())
    }

    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>> {
        self.check(&event)?;

        let context = Arc::clone(event.context());
        let guard = ActiveGuard::new(Arc::clone(&self.in_flight));
        let stage = Arc::clone(&self.ctx.stage);
        let metrics = Arc::clone(&self.ctx.metrics);
        let task: Task = Box::new(move || {
            let _guard = guard;
            // Stage failures complete the event
            let _ = execute(stage.as_ref(), event, &metrics);
        });

        match self.ctx.scheduler.submit(task) {
            Ok(()) => {
                self.ctx.admission.on_scheduled();
                Ok(None)
            }
            Err(SubmitError::Rejected(_)) => {
                self.ctx.admission.on_rejected(self.ctx.scheduler.name());
                self.ctx.metrics.record_failed();
                context.fail("light scheduler is busy");
                Ok(None)
            }
            Err(SubmitError::Stopped(_)) => {
                self.ctx.metrics.record_failed();
                context.fail("light scheduler is stopped");
                Err(StrategyError::Scheduler(SchedulerError::Stopped(
                    self.ctx.scheduler.name().to_string(),
                )))
            }
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
