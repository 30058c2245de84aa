//! Flow: a strategy, its wrapped stages and its sink driven together
//!
//! This is how an owning pipeline uses the subsystem:
//! - [`Flow::dispatch`]: non-blocking admission, then `emit`
//! - [`Flow::process`]: blocking admission, then `accept`
//! - [`Flow::dispose`]: dispose the sink, then drain and release the strategy

use std::sync::Arc;

use crate::backpressure::BackPressureReason;
use crate::drain::DrainOutcome;
use crate::error::Result;
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::sink::EventSink;
use crate::stage::{Stage, StageChain};
use crate::strategy::{PipelineOwner, ProcessingStrategy};

#[cfg(test)]
#[path = "flow_test.rs"]
mod tests;

/// A pipeline's stages behind its strategy's sink
pub struct Flow {
    owner: PipelineOwner,
    strategy: Arc<dyn ProcessingStrategy>,
    sink: Arc<dyn EventSink>,
}

impl Flow {
    /// Wrap each stage with the strategy, chain them and build the sink
    ///
    /// # Errors
    ///
    /// Propagates `create_sink` failures, including schedulers that could
    /// not be acquired.
    pub fn build(
        owner: PipelineOwner,
        strategy: Arc<dyn ProcessingStrategy>,
        stages: Vec<Arc<dyn Stage>>,
    ) -> Result<Self> {
        let wrapped: Vec<Arc<dyn Stage>> = stages
            .into_iter()
            .map(|stage| strategy.on_processor(stage))
            .collect();
        let chain: Arc<dyn Stage> = Arc::new(StageChain::new(wrapped));
        let sink = strategy.create_sink(&owner, chain)?;

        Ok(Self {
            owner,
            strategy,
            sink,
        })
    }

    /// Admit without blocking and hand the event to the sink
    ///
    /// `Some(reason)` means the event was not taken. Refused at admission it
    /// is left untouched and can be dispatched again; refused by the sink
    /// after admission it is failed, so a retry needs a fresh event.
    pub fn dispatch(&self, event: &Event) -> Result<Option<BackPressureReason>> {
        if let Some(reason) = self.strategy.check_backpressure_emitting(event) {
            return Ok(Some(reason));
        }

        let context = Arc::clone(event.context());
        match self.sink.emit(event.clone()) {
            Ok(None) => Ok(None),
            Ok(Some(reason)) => {
                // Admitted but refused downstream: fail it to release the slot
                context.fail(format!("refused by sink: {}", reason));
                Ok(Some(reason))
            }
            Err(e) => {
                context.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for admission and hand the event to the sink
    pub fn process(&self, event: Event) -> Result<()> {
        let context = Arc::clone(event.context());
        let result = self
            .strategy
            .check_backpressure_accepting(&event)
            .and_then(|()| self.sink.accept(event));

        if let Err(e) = &result {
            context.fail(e.to_string());
        }
        result
    }

    /// Dispose the sink, then the strategy if it is lifecycle-managed
    pub fn dispose(&self) -> DrainOutcome {
        self.sink.dispose();
        match self.strategy.as_lifecycle() {
            Some(lifecycle) => lifecycle.dispose(),
            None => DrainOutcome::Drained,
        }
    }

    /// Owning pipeline
    #[inline]
    pub fn owner(&self) -> &PipelineOwner {
        &self.owner
    }

    /// Strategy driving this flow
    #[inline]
    pub fn strategy(&self) -> &Arc<dyn ProcessingStrategy> {
        &self.strategy
    }

    /// Sink feeding the stages
    #[inline]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Strategy counters
    pub fn metrics(&self) -> Arc<StrategyMetrics> {
        self.strategy.metrics_handle()
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("pipeline", &self.owner.name())
            .field("sink", &self.sink.name())
            .field("synchronous", &self.strategy.is_synchronous())
            .finish()
    }
}
