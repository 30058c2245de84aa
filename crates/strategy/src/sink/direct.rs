//! Synchronous direct sink

use std::sync::Arc;

use parking_lot::RwLock;

use super::{EventSink, execute};
use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::stage::Stage;

/// Runs the stage on the calling thread
///
/// No admission control of its own. `dispose()` detaches the stage, so a
/// disposed sink holds no reference to the pipeline.
pub struct DirectSink {
    name: String,
    stage: RwLock<Option<Arc<dyn Stage>>>,
    metrics: Arc<StrategyMetrics>,
}

impl DirectSink {
    /// Create a sink over `stage`
    pub fn new(name: impl Into<String>, stage: Arc<dyn Stage>, metrics: Arc<StrategyMetrics>) -> Self {
        Self {
            name: name.into(),
            stage: RwLock::new(Some(stage)),
            metrics,
        }
    }

    fn stage(&self) -> Result<Arc<dyn Stage>> {
        // Clone out so no lock is held while the stage runs
        self.stage
            .read()
            .clone()
            .ok_or_else(|| StrategyError::closed(self.name.as_str()))
    }
}

impl EventSink for DirectSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, event: Event) -> Result<()> {
        let stage = self.stage()?;
        execute(stage.as_ref(), event, &self.metrics)?;
        Ok(())
    }

    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>> {
        self.accept(event)?;
        Ok(None)
    }

    fn dispose(&self) {
        if self.stage.write().take().is_some() {
            tracing::debug!(sink = %self.name, "direct sink disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.stage.read().is_none()
    }
}

impl std::fmt::Debug for DirectSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSink")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
