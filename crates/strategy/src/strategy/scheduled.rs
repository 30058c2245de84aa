//! Scheduler hop for stages that must not run on the light pool

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use weir_scheduler::{Scheduler, SchedulerKind, SubmitError, Task};

use crate::admission::Admission;
use crate::event::Event;
use crate::stage::{ProcessingType, Stage, StageError, StageResult};

/// Schedulers held by an asynchronous strategy
#[derive(Debug, Clone)]
pub(crate) struct Schedulers {
    pub(crate) light: Arc<dyn Scheduler>,
    pub(crate) pipeline: Arc<dyn Scheduler>,
    pub(crate) intensive: Arc<dyn Scheduler>,
}

impl Schedulers {
    pub(crate) fn get(&self, kind: SchedulerKind) -> &Arc<dyn Scheduler> {
        match kind {
            SchedulerKind::Light => &self.light,
            SchedulerKind::Pipeline => &self.pipeline,
            SchedulerKind::Intensive => &self.intensive,
        }
    }

    /// Stop in dependency order: dispatch first, then the pools it feeds
    pub(crate) fn stop(&self) {
        self.light.stop();
        self.pipeline.stop();
        self.intensive.stop();
    }
}

/// Filled once a strategy acquired its schedulers; emptied on dispose
pub(crate) type SchedulerSlot = Arc<RwLock<Option<Schedulers>>>;

/// Runs the wrapped stage on the pipeline or intensive scheduler
///
/// The caller blocks until the stage finished on the target scheduler.
/// Called from one of that scheduler's own workers, the stage runs inline.
pub struct ScheduledStage {
    inner: Arc<dyn Stage>,
    target: SchedulerKind,
    slot: SchedulerSlot,
    admission: Admission,
    retry_interval: Duration,
}

impl ScheduledStage {
    pub(crate) fn new(
        inner: Arc<dyn Stage>,
        target: SchedulerKind,
        slot: SchedulerSlot,
        admission: Admission,
        retry_interval: Duration,
    ) -> Self {
        Self {
            inner,
            target,
            slot,
            admission,
            retry_interval,
        }
    }

    /// Scheduler this stage runs on
    #[inline]
    pub fn target(&self) -> SchedulerKind {
        self.target
    }

    fn scheduler(&self) -> Result<Arc<dyn Scheduler>, StageError> {
        self.slot
            .read()
            .as_ref()
            .map(|schedulers| Arc::clone(schedulers.get(self.target)))
            .ok_or_else(|| {
                StageError::new(
                    self.inner.name(),
                    format!("{} scheduler is not available", self.target),
                )
            })
    }
}

impl Stage for ScheduledStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn processing_type(&self) -> ProcessingType {
        self.inner.processing_type()
    }

    fn process(&self, event: Event) -> StageResult {
        let scheduler = self.scheduler()?;
        if scheduler.is_current_thread() {
            return self.inner.process(event);
        }

        let (tx, rx) = crossfire::mpmc::bounded_blocking::<StageResult>(1);
        let inner = Arc::clone(&self.inner);
        let mut task: Task = Box::new(move || {
            let _ = tx.send(inner.process(event));
        });

        loop {
            match scheduler.submit(task) {
                Ok(()) => {
                    self.admission.on_scheduled();
                    break;
                }
                Err(SubmitError::Rejected(returned)) => {
                    self.admission.on_rejected(scheduler.name());
                    thread::sleep(self.retry_interval);
                    task = returned;
                }
                Err(SubmitError::Stopped(_)) => {
                    return Err(StageError::new(
                        self.inner.name(),
                        format!("scheduler '{}' is stopped", scheduler.name()),
                    ));
                }
            }
        }

        // A panicking stage drops the sender without replying
        rx.recv().map_err(|_| {
            StageError::new(
                self.inner.name(),
                format!("stage aborted on scheduler '{}'", scheduler.name()),
            )
        })?
    }
}

impl std::fmt::Debug for ScheduledStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledStage")
            .field("stage", &self.inner.name())
            .field("target", &self.target)
            .finish()
    }
}
