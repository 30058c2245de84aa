//! Sink family
//!
//! Every sink is an in-process entry point into a pipeline:
//! - `accept` may block the caller
//! - `emit` never waits for capacity; refusal comes back as a reason
//! - `dispose` is idempotent; afterwards both fail with `SinkClosed`
//!
//! | Sink | Threading |
//! |------|-----------|
//! | [`DirectSink`] | calling thread |
//! | [`PerEventSink`] | light scheduler per emitted event, calling thread on accept |
//! | [`PerThreadSink`] | one downstream sink per calling thread, built lazily |
//! | [`ProvidedSink`] | fresh ingress handle from a provider per call |
//! | [`TransactionAwareSink`] | transactional events direct, the rest delegated |

mod direct;
mod per_event;
mod per_thread;
mod provided;
mod transactional;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub use direct::DirectSink;
pub use per_event::PerEventSink;
pub use per_thread::{PerThreadSink, SinkSupplier};
pub use provided::ProvidedSink;
pub use transactional::TransactionAwareSink;

use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::stage::{Stage, StageResult};

#[cfg(test)]
#[path = "sink_test.rs"]
mod tests;

impl std::fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").field("name", &self.name()).finish_non_exhaustive()
    }
}

/// Entry point accepting events into a pipeline
pub trait EventSink: Send + Sync {
    /// Sink name (for logging and errors)
    fn name(&self) -> &str;

    /// Deliver an event, blocking if the sink needs to
    ///
    /// # Errors
    ///
    /// Stage failures propagate unchanged as `StrategyError::Stage`.
    /// After `dispose()`, returns `StrategyError::SinkClosed`.
    fn accept(&self, event: Event) -> Result<()>;

    /// Deliver an event without waiting for capacity
    ///
    /// Returns `Some(reason)` if the sink could not take the event.
    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>>;

    /// Stop accepting events; idempotent
    fn dispose(&self);

    /// True once disposed
    fn is_disposed(&self) -> bool;
}

/// Run a stage and complete the event with its result
pub(crate) fn execute(stage: &dyn Stage, event: Event, metrics: &StrategyMetrics) -> StageResult {
    let context = Arc::clone(event.context());
    let event_id = event.id();

    match stage.process(event) {
        Ok(out) => {
            metrics.record_completed();
            context.complete(out.payload().clone());
            Ok(out)
        }
        Err(err) => {
            metrics.record_failed();
            tracing::debug!(event_id, stage = err.stage(), error = %err, "event failed");
            context.fail(err.to_string());
            Err(err)
        }
    }
}

/// Counts one unit of in-flight work until dropped
pub(crate) struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    pub(crate) fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Start/stop switch shared by a strategy and its asynchronous sinks
#[derive(Debug)]
pub(crate) struct Availability {
    pipeline: String,
    running: AtomicBool,
}

impl Availability {
    pub(crate) fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StrategyError::NotStarted {
                pipeline: self.pipeline.clone(),
            })
        }
    }
}

/// Asynchronous sinks refuse events bound to a transaction
pub(crate) fn reject_transactional(event: &Event) -> Result<()> {
    if event.is_transactional() {
        return Err(StrategyError::Transactional {
            event_id: event.id(),
        });
    }
    Ok(())
}
