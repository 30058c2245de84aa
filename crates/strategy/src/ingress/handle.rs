//! Ingress handle: a bounded queue drained on the light scheduler

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossfire::{MRx, MTx, TryRecvError, TrySendError};
use parking_lot::RwLock;
use weir_scheduler::{Scheduler, SchedulerError, SubmitError, Task};

use crate::admission::Admission;
use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::sink::execute;
use crate::stage::Stage;

/// Events handled by one drain task before it yields its worker
const DRAIN_BATCH: usize = 64;

/// Everything a handle needs besides its own queue
#[derive(Clone)]
pub(crate) struct HandleContext {
    pub(crate) stage: Arc<dyn Stage>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) admission: Admission,
    pub(crate) metrics: Arc<StrategyMetrics>,
    pub(crate) retry_interval: Duration,
}

/// Bounded queue in front of a stage
pub struct IngressHandle {
    name: String,
    /// `None` once closed
    sender: RwLock<Option<MTx<Event>>>,
    receiver: MRx<Event>,
    /// Pushed minus popped; may dip below zero transiently
    queued: AtomicIsize,
    scheduled: AtomicBool,
    /// Set before the sender is dropped; waiting producers give up on it
    closing: AtomicBool,
    closed: AtomicBool,
    finished: AtomicBool,
    /// Owning provider's active-handle counter
    active: Arc<AtomicUsize>,
    ctx: HandleContext,
}

impl IngressHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        capacity: usize,
        active: Arc<AtomicUsize>,
        ctx: HandleContext,
    ) -> Arc<Self> {
        let (tx, rx) = crossfire::mpmc::bounded_blocking::<Event>(capacity.max(1));
        active.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            name: name.into(),
            sender: RwLock::new(Some(tx)),
            receiver: rx,
            queued: AtomicIsize::new(0),
            scheduled: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            active,
            ctx,
        })
    }

    /// Handle name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the handle was closed and its queue fully consumed
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Push an event, waiting while the queue is full
    ///
    /// Returns a closed error if the handle closes while waiting.
    pub fn accept(self: &Arc<Self>, mut event: Event) -> Result<()> {
        while let Some(returned) = self.push(event)? {
            event = returned;
            thread::sleep(self.ctx.retry_interval);
        }
        self.schedule()
    }

    /// Push an event if there is room
    ///
    /// A full queue or a refusing light scheduler reports
    /// `RequiredSchedulerBusy`; neither waits.
    pub fn emit(self: &Arc<Self>, event: Event) -> Result<Option<BackPressureReason>> {
        if self.push(event)?.is_some() {
            return Ok(Some(BackPressureReason::RequiredSchedulerBusy));
        }
        self.try_schedule()
    }

    /// Refuse new events; what is queued still gets processed
    pub(crate) fn close(self: &Arc<Self>) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.sender.write().take());
        self.closed.store(true, Ordering::SeqCst);

        // Kick a drain task so the handle observes the closed queue
        if let Err(e) = self.try_schedule() {
            tracing::debug!(handle = %self.name, error = %e, "closing handle without a scheduler");
        }
    }

    /// Try to queue an event; a full queue hands it back
    fn push(&self, event: Event) -> Result<Option<Event>> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        let guard = self.sender.read();
        let tx = guard.as_ref().ok_or_else(|| self.closed_error())?;
        match tx.try_send(event) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
            Err(TrySendError::Full(event)) => Ok(Some(event)),
            Err(TrySendError::Disconnected(_)) => Err(self.closed_error()),
        }
    }

    /// Ensure a drain task is queued or running, waiting out a busy scheduler
    fn schedule(self: &Arc<Self>) -> Result<()> {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let handle = Arc::clone(self);
        let mut task: Task = Box::new(move || handle.run());
        loop {
            match self.ctx.scheduler.submit(task) {
                Ok(()) => {
                    self.ctx.admission.on_scheduled();
                    return Ok(());
                }
                Err(SubmitError::Rejected(returned)) => {
                    self.ctx.admission.on_rejected(self.ctx.scheduler.name());
                    if self.closing.load(Ordering::SeqCst) {
                        self.fail_pending("light scheduler is busy");
                        self.scheduled.store(false, Ordering::SeqCst);
                        return Ok(());
                    }
                    thread::sleep(self.ctx.retry_interval);
                    task = returned;
                }
                Err(SubmitError::Stopped(_)) => return Err(self.stopped()),
            }
        }
    }

    /// Ensure a drain task is queued or running without waiting
    ///
    /// A refusing scheduler fails whatever is queued, since no drain task
    /// will pick it up.
    fn try_schedule(self: &Arc<Self>) -> Result<Option<BackPressureReason>> {
        let mut refused = None;
        while !self.scheduled.swap(true, Ordering::SeqCst) {
            let handle = Arc::clone(self);
            match self.ctx.scheduler.submit(Box::new(move || handle.run())) {
                Ok(()) => {
                    self.ctx.admission.on_scheduled();
                    break;
                }
                Err(SubmitError::Rejected(_)) => {
                    self.ctx.admission.on_rejected(self.ctx.scheduler.name());
                    self.fail_pending("light scheduler is busy");
                    self.scheduled.store(false, Ordering::SeqCst);
                    refused = Some(BackPressureReason::RequiredSchedulerBusy);
                    // Pushes that saw the claim above are still queued
                    if self.queued.load(Ordering::SeqCst) <= 0 {
                        break;
                    }
                }
                Err(SubmitError::Stopped(_)) => return Err(self.stopped()),
            }
        }
        Ok(refused)
    }

    /// Give up the drain claim after the scheduler stopped
    fn stopped(&self) -> StrategyError {
        // Still owner of the drain: nobody else consumes the queue
        self.fail_pending("light scheduler is stopped");
        self.scheduled.store(false, Ordering::SeqCst);
        StrategyError::Scheduler(SchedulerError::Stopped(self.ctx.scheduler.name().to_string()))
    }

    /// Drain task body
    fn run(self: Arc<Self>) {
        let mut processed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    let _ = execute(self.ctx.stage.as_ref(), event, &self.ctx.metrics);

                    processed += 1;
                    if processed >= DRAIN_BATCH {
                        let next = Arc::clone(&self);
                        match self.ctx.scheduler.submit(Box::new(move || next.run())) {
                            Ok(()) => return,
                            // Keep going on this worker
                            Err(_) => processed = 0,
                        }
                    }
                }
                Err(TryRecvError::Empty) => {
                    self.scheduled.store(false, Ordering::SeqCst);
                    // A push or close may have raced the store above
                    let pending = self.queued.load(Ordering::SeqCst) > 0
                        || self.closed.load(Ordering::SeqCst);
                    if pending
                        && self
                            .scheduled
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                    {
                        continue;
                    }
                    return;
                }
                Err(TryRecvError::Disconnected) => {
                    self.scheduled.store(false, Ordering::SeqCst);
                    self.finish();
                    return;
                }
            }
        }
    }

    /// Fail everything queued; finishes the handle if it was closed
    fn fail_pending(&self, reason: &str) {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    self.ctx.metrics.record_failed();
                    event.context().fail(reason);
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.finish();
                    return;
                }
            }
        }
    }

    fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!(handle = %self.name, "ingress handle finished");
        }
    }

    fn closed_error(&self) -> StrategyError {
        StrategyError::closed(self.name.as_str())
    }
}

impl std::fmt::Debug for IngressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressHandle")
            .field("name", &self.name)
            .field("queued", &self.queued.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("finished", &self.is_finished())
            .finish()
    }
}
