//! Transaction-aware decoration
//!
//! Wraps an asynchronous strategy so events bound to a transaction run on
//! the calling thread, outside admission control. Everything else goes
//! through the wrapped strategy unchanged.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{EventStream, Lifecycle, PipelineOwner, ProcessingStrategy};
use crate::backpressure::BackPressureReason;
use crate::drain::DrainOutcome;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::sink::{DirectSink, EventSink, TransactionAwareSink};
use crate::stage::{ProcessingType, Stage, StageResult};

/// Runs transactional events synchronously, delegates the rest
///
/// Sinks it creates are disposed together with the wrapped strategy.
pub struct TransactionAwareStrategy {
    delegate: Arc<dyn ProcessingStrategy>,
    /// Sinks handed out so far; `None` once disposed
    sinks: Mutex<Option<Vec<Arc<TransactionAwareSink>>>>,
}

impl TransactionAwareStrategy {
    /// Decorate `delegate`
    pub fn new(delegate: Arc<dyn ProcessingStrategy>) -> Self {
        Self {
            delegate,
            sinks: Mutex::new(Some(Vec::new())),
        }
    }

    /// Wrapped strategy
    #[inline]
    pub fn delegate(&self) -> &Arc<dyn ProcessingStrategy> {
        &self.delegate
    }
}

impl ProcessingStrategy for TransactionAwareStrategy {
    fn on_processor(&self, stage: Arc<dyn Stage>) -> Arc<dyn Stage> {
        let scheduled = self.delegate.on_processor(Arc::clone(&stage));
        Arc::new(TransactionAwareStage {
            direct: stage,
            scheduled,
        })
    }

    fn create_sink(&self, owner: &PipelineOwner, stage: Arc<dyn Stage>) -> Result<Arc<dyn EventSink>> {
        let delegate = self.delegate.create_sink(owner, Arc::clone(&stage))?;
        let direct = DirectSink::new(
            format!("{}.transactional", owner.name()),
            stage,
            self.delegate.metrics_handle(),
        );
        let sink = Arc::new(TransactionAwareSink::new(
            format!("{}.sink", owner.name()),
            direct,
            delegate,
        ));

        match self.sinks.lock().as_mut() {
            Some(sinks) => sinks.push(Arc::clone(&sink)),
            None => {
                sink.dispose();
                return Err(StrategyError::closed(owner.name()));
            }
        }
        Ok(sink)
    }

    fn check_backpressure_accepting(&self, event: &Event) -> Result<()> {
        if event.is_transactional() {
            return Ok(());
        }
        self.delegate.check_backpressure_accepting(event)
    }

    fn check_backpressure_emitting(&self, event: &Event) -> Option<BackPressureReason> {
        if event.is_transactional() {
            return None;
        }
        self.delegate.check_backpressure_emitting(event)
    }

    fn register_internal_sink(&self, stream: EventStream, name: &str) -> Result<()> {
        self.delegate.register_internal_sink(stream, name)
    }

    fn is_synchronous(&self) -> bool {
        self.delegate.is_synchronous()
    }

    fn configure_internal_publisher(&self, stream: EventStream) -> EventStream {
        self.delegate.configure_internal_publisher(stream)
    }

    fn metrics_handle(&self) -> Arc<StrategyMetrics> {
        self.delegate.metrics_handle()
    }

    fn as_lifecycle(&self) -> Option<&dyn Lifecycle> {
        self.delegate.as_lifecycle().map(|_| self as &dyn Lifecycle)
    }
}

impl Lifecycle for TransactionAwareStrategy {
    fn initialise(&self) -> Result<()> {
        self.delegate.as_lifecycle().map_or(Ok(()), |l| l.initialise())
    }

    fn start(&self) -> Result<()> {
        self.delegate.as_lifecycle().map_or(Ok(()), |l| l.start())
    }

    fn stop(&self) -> Result<()> {
        self.delegate.as_lifecycle().map_or(Ok(()), |l| l.stop())
    }

    fn dispose(&self) -> DrainOutcome {
        let sinks = self.sinks.lock().take().unwrap_or_default();
        for sink in &sinks {
            sink.dispose();
        }
        self.delegate
            .as_lifecycle()
            .map_or(DrainOutcome::Drained, |l| l.dispose())
    }
}

/// Transactional events skip the scheduler hop
struct TransactionAwareStage {
    direct: Arc<dyn Stage>,
    scheduled: Arc<dyn Stage>,
}

impl Stage for TransactionAwareStage {
    fn name(&self) -> &str {
        self.direct.name()
    }

    fn processing_type(&self) -> ProcessingType {
        self.direct.processing_type()
    }

    fn process(&self, event: Event) -> StageResult {
        if event.is_transactional() {
            self.direct.process(event)
        } else {
            self.scheduled.process(event)
        }
    }
}

#[cfg(test)]
#[path = "transactional_test.rs"]
mod tests;
