//! Processing strategies
//!
//! A strategy is the per-pipeline policy object: it wraps stages for
//! scheduling, builds the pipeline's sink, and owns admission control.
//!
//! Every family is the same [`PipelineStrategy`] running a different
//! [`Profile`]:
//!
//! | Kind | Execution | Ingress | Sink |
//! |------|-----------|---------|------|
//! | `direct` | synchronous | per call | `DirectSink` |
//! | `direct_per_thread` | synchronous | per thread | `PerThreadSink` over `DirectSink`s |
//! | `stream` | asynchronous | per call | `PerEventSink` |
//! | `cached_thread` | asynchronous | per thread | `ProvidedSink` over cached handles |
//! | `emitter` | asynchronous | pooled | `ProvidedSink` over an emitter pool |
//!
//! `transactional_emitter` decorates the emitter with
//! [`TransactionAwareStrategy`].

mod pipeline;
mod profile;
mod scheduled;
mod transactional;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weir_scheduler::{SchedulerConfig, SchedulerService};

use crate::backpressure::BackPressureReason;
use crate::drain::{DrainDiagnostics, DrainOutcome, ShutdownTimeout, TracingDiagnostics};
use crate::error::Result;
use crate::event::Event;
use crate::metrics::StrategyMetrics;
use crate::sink::EventSink;
use crate::stage::Stage;

pub use pipeline::PipelineStrategy;
pub(crate) use pipeline::Settings;
pub use profile::{AdmissionCheck, Execution, Ingress, Profile};
pub use scheduled::ScheduledStage;
pub use transactional::TransactionAwareStrategy;

/// Auxiliary event stream folded into a strategy
pub type EventStream = Box<dyn Iterator<Item = Event> + Send>;

/// Policy object defining scheduling and concurrency limits for a pipeline
pub trait ProcessingStrategy: Send + Sync {
    /// Wrap a stage for this strategy's scheduling
    ///
    /// The returned stage behaves like `stage` but may run it on another
    /// scheduler depending on its declared processing type.
    fn on_processor(&self, stage: Arc<dyn Stage>) -> Arc<dyn Stage>;

    /// Build the sink feeding `stage`
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::Configuration` if the schedulers this
    /// strategy needs could not be acquired.
    fn create_sink(&self, owner: &PipelineOwner, stage: Arc<dyn Stage>) -> Result<Arc<dyn EventSink>>;

    /// Blocking admission: wait until the event may enter
    fn check_backpressure_accepting(&self, event: &Event) -> Result<()>;

    /// Non-blocking admission: `None` admits the event
    fn check_backpressure_emitting(&self, event: &Event) -> Option<BackPressureReason>;

    /// Consume `stream` into this strategy's sink under its admission control
    fn register_internal_sink(&self, stream: EventStream, name: &str) -> Result<()>;

    /// True when events run entirely on the calling thread without admission control
    fn is_synchronous(&self) -> bool;

    /// Apply this strategy's admission to a raw event stream
    fn configure_internal_publisher(&self, stream: EventStream) -> EventStream;

    /// Counters shared by everything this strategy built
    fn metrics_handle(&self) -> Arc<StrategyMetrics>;

    /// Lifecycle capability, for strategies that own pooled threads
    fn as_lifecycle(&self) -> Option<&dyn Lifecycle> {
        None
    }
}

/// Initialise / start / stop / dispose management
pub trait Lifecycle: Send + Sync {
    /// Acquire schedulers
    fn initialise(&self) -> Result<()>;

    /// Accept events
    fn start(&self) -> Result<()>;

    /// Refuse events until started again
    fn stop(&self) -> Result<()>;

    /// Drain within the shutdown timeout and release schedulers
    ///
    /// Always returns; an incomplete drain is reported through the
    /// strategy's diagnostics, not as an error.
    fn dispose(&self) -> DrainOutcome;
}

/// Identity and shutdown settings of the pipeline that owns a sink
#[derive(Debug, Clone)]
pub struct PipelineOwner {
    name: String,
    shutdown_timeout: ShutdownTimeout,
}

impl PipelineOwner {
    /// Create an owner
    pub fn new(name: impl Into<String>, shutdown_timeout: ShutdownTimeout) -> Self {
        Self {
            name: name.into(),
            shutdown_timeout,
        }
    }

    /// Pipeline name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long disposal may wait for in-flight events
    #[inline]
    pub fn shutdown_timeout(&self) -> ShutdownTimeout {
        self.shutdown_timeout
    }
}

/// Collaborators handed to a factory when it creates a strategy
#[derive(Clone)]
pub struct StrategyContext {
    scheduler_service: Arc<dyn SchedulerService>,
    scheduler_config: SchedulerConfig,
    diagnostics: Arc<dyn DrainDiagnostics>,
    cancel: CancellationToken,
}

impl StrategyContext {
    /// Context over a scheduler provider and the artifact's scheduler configuration
    pub fn new(scheduler_service: Arc<dyn SchedulerService>, scheduler_config: SchedulerConfig) -> Self {
        Self {
            scheduler_service,
            scheduler_config,
            diagnostics: Arc::new(TracingDiagnostics),
            cancel: CancellationToken::new(),
        }
    }

    /// Report incomplete drains through `diagnostics`
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DrainDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Interrupt drains when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scheduler provider
    #[inline]
    pub fn scheduler_service(&self) -> &Arc<dyn SchedulerService> {
        &self.scheduler_service
    }

    /// Artifact-level scheduler configuration
    #[inline]
    pub fn scheduler_config(&self) -> &SchedulerConfig {
        &self.scheduler_config
    }

    /// Drain diagnostics
    #[inline]
    pub fn diagnostics(&self) -> &Arc<dyn DrainDiagnostics> {
        &self.diagnostics
    }

    /// Drain cancellation token
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("scheduler_config", &self.scheduler_config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
