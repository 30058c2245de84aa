//! Weir Strategy - processing strategies for in-process pipelines
//!
//! A processing strategy decides where a pipeline's stages run and how many
//! events may be in flight. It builds the pipeline's sink, the entry point
//! callers push events into.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Flow::dispatch ──► admission ──► EventSink ──► stage chain
//!                                  │              │
//!                          in-flight counter   ingress handles
//!                          + busy flag         (light scheduler)
//!                                                 │
//!                                   blocking / intensive stages hop to
//!                                   the pipeline / intensive scheduler
//! ```
//!
//! # Backpressure
//!
//! `emit` never blocks: refusal comes back as `Some(BackPressureReason)`.
//! `accept` and `check_backpressure_accepting` block instead.
//!
//! # Shutdown
//!
//! Disposal closes admission, disposes sinks, waits for active ingress
//! handles within the owner's shutdown timeout (zero or negative: do not
//! wait), then stops schedulers light → pipeline → intensive. Incomplete
//! drains go to [`DrainDiagnostics`]; disposal never fails.

pub mod admission;
pub mod backpressure;
pub mod drain;
pub mod error;
pub mod event;
pub mod factory;
pub mod flow;
pub mod ingress;
pub mod metrics;
pub mod registry;
pub mod sink;
pub mod stage;
pub mod strategy;

/// Recording collaborators and stages for strategy tests
pub mod test_utils;

pub use admission::Admission;
pub use backpressure::BackPressureReason;
pub use drain::{DrainDiagnostics, DrainOutcome, Drainer, ShutdownTimeout, TracingDiagnostics};
pub use error::{Result, StrategyError};
pub use event::{Event, EventContext, Outcome};
pub use factory::{SCHEDULER_RETRY_INTERVAL, StrategyFactory, StrategyType};
pub use flow::Flow;
pub use ingress::{CachedThreadIngressProvider, EmitterPool, IngressHandle, IngressProvider};
pub use metrics::{BackpressureTracker, MetricsSnapshot, StrategyMetrics};
pub use registry::{StrategyRegistry, default_registry};
pub use sink::{DirectSink, EventSink, PerEventSink, PerThreadSink, ProvidedSink, SinkSupplier, TransactionAwareSink};
pub use stage::{FnStage, IdentityStage, ProcessingType, Stage, StageChain, StageError, StageResult};
pub use strategy::{
    AdmissionCheck, EventStream, Execution, Ingress, Lifecycle, PipelineOwner, PipelineStrategy,
    ProcessingStrategy, Profile, ScheduledStage, StrategyContext, TransactionAwareStrategy,
};
