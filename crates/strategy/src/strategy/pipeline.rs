//! The pipeline strategy
//!
//! One implementation for every strategy family, driven by its [`Profile`].
//!
//! Asynchronous profiles acquire three schedulers from the scheduler
//! provider: `light` for ingress dispatch, `pipeline` for blocking stages
//! and `intensive` for CPU-heavy stages. Acquisition happens in
//! `initialise()`, or on the first `create_sink()` for strategies that
//! were never initialised. A failed acquisition is remembered and surfaces
//! from `create_sink()`.
//!
//! # Disposal
//!
//! 1. Close admission (blocked `check_backpressure_accepting` calls fail)
//! 2. Dispose every sink; providers stop handing out handles
//! 3. Wait for active handles and internal sinks within the shutdown timeout
//! 4. Stop schedulers: light, pipeline, intensive

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use weir_config::StrategyKind;
use weir_scheduler::{SchedulerConfig, SchedulerKind};

use super::scheduled::{ScheduledStage, SchedulerSlot, Schedulers};
use super::{
    EventStream, Ingress, Lifecycle, PipelineOwner, ProcessingStrategy, Profile, StrategyContext,
};
use crate::admission::Admission;
use crate::backpressure::BackPressureReason;
use crate::drain::{DrainOutcome, Drainer, ShutdownTimeout};
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::ingress::{CachedThreadIngressProvider, EmitterPool, HandleContext, IngressProvider};
use crate::metrics::StrategyMetrics;
use crate::sink::{
    ActiveGuard, Availability, DirectSink, EventSink, PerEventSink, PerThreadSink, ProvidedSink,
    SinkSupplier,
};
use crate::stage::{ProcessingType, Stage};

/// Tunables a factory hands to the strategies it creates
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) buffer_size: usize,
    pub(crate) subscriber_count: usize,
    pub(crate) max_concurrency: Option<usize>,
    pub(crate) shutdown_timeout: ShutdownTimeout,
    pub(crate) drain_poll_interval: Duration,
    pub(crate) retry_interval: Duration,
}

/// Processing strategy for one pipeline
pub struct PipelineStrategy {
    pipeline: String,
    kind: StrategyKind,
    profile: Profile,
    settings: Settings,
    context: StrategyContext,
    scheduler_config: SchedulerConfig,
    metrics: Arc<StrategyMetrics>,
    admission: Admission,
    availability: Arc<Availability>,
    schedulers: SchedulerSlot,
    /// Why scheduler acquisition failed, if it did
    acquisition_failure: Mutex<Option<String>>,
    /// Serializes acquisition
    acquiring: Mutex<()>,
    sinks: Mutex<Vec<Arc<dyn EventSink>>>,
    providers: Mutex<Vec<Arc<dyn IngressProvider>>>,
    /// Running internal sink threads
    internal_active: Arc<AtomicUsize>,
    /// Emitted per-event passes not yet finished
    dispatching: Arc<AtomicUsize>,
    /// Owner's timeout once a sink was created
    shutdown_timeout: RwLock<ShutdownTimeout>,
    disposed: AtomicBool,
}

impl PipelineStrategy {
    pub(crate) fn new(
        pipeline: impl Into<String>,
        kind: StrategyKind,
        profile: Profile,
        settings: Settings,
        context: StrategyContext,
    ) -> Self {
        let pipeline = pipeline.into();
        let metrics = Arc::new(StrategyMetrics::new());
        let admission = Admission::new(
            pipeline.clone(),
            settings.max_concurrency,
            profile.admission().is_eager(),
            Arc::clone(&metrics),
        );

        tracing::debug!(
            pipeline = %pipeline,
            kind = %kind,
            buffer_size = settings.buffer_size,
            subscriber_count = settings.subscriber_count,
            max_concurrency = ?settings.max_concurrency,
            "strategy created"
        );

        Self {
            scheduler_config: context.scheduler_config().for_pipeline(&pipeline),
            availability: Arc::new(Availability::new(pipeline.clone())),
            shutdown_timeout: RwLock::new(settings.shutdown_timeout),
            pipeline,
            kind,
            profile,
            settings,
            context,
            metrics,
            admission,
            schedulers: Arc::new(RwLock::new(None)),
            acquisition_failure: Mutex::new(None),
            acquiring: Mutex::new(()),
            sinks: Mutex::new(Vec::new()),
            providers: Mutex::new(Vec::new()),
            internal_active: Arc::new(AtomicUsize::new(0)),
            dispatching: Arc::new(AtomicUsize::new(0)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Owning pipeline
    #[inline]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Strategy family
    #[inline]
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Tagged configuration
    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Admission controller
    #[inline]
    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// A scheduler refused work: report busy until the next successful submission
    pub fn on_rejected(&self, scheduler: &str) {
        self.admission.on_rejected(scheduler);
    }

    /// True once schedulers were acquired and not yet released
    pub fn has_schedulers(&self) -> bool {
        self.schedulers.read().is_some()
    }

    /// True once disposed
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Handles, internal sinks and per-event passes that may still deliver events
    pub fn active_handles(&self) -> usize {
        let providers: usize = self.providers.lock().iter().map(|p| p.active_handles()).sum();
        providers
            + self.internal_active.load(Ordering::SeqCst)
            + self.dispatching.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> StrategyError {
        StrategyError::closed(self.pipeline.as_str())
    }

    /// Schedulers, acquiring them on first use
    fn ensure_schedulers(&self) -> Result<Schedulers> {
        if let Some(schedulers) = self.schedulers.read().as_ref() {
            return Ok(schedulers.clone());
        }

        let _acquiring = self.acquiring.lock();
        if let Some(schedulers) = self.schedulers.read().as_ref() {
            return Ok(schedulers.clone());
        }
        if let Some(message) = self.acquisition_failure.lock().clone() {
            return Err(StrategyError::configuration(self.pipeline.as_str(), message));
        }
        if self.is_disposed() {
            return Err(self.closed_error());
        }

        match self.acquire() {
            Ok(schedulers) => {
                *self.schedulers.write() = Some(schedulers.clone());
                Ok(schedulers)
            }
            Err(e) => {
                let message = e.to_string();
                *self.acquisition_failure.lock() = Some(message.clone());
                Err(StrategyError::configuration(self.pipeline.as_str(), message))
            }
        }
    }

    /// Acquire light, pipeline and intensive; stop what was acquired on failure
    fn acquire(&self) -> Result<Schedulers> {
        let service = self.context.scheduler_service();
        let config = &self.scheduler_config;

        let light = service.light_scheduler(config)?;
        let pipeline = match service.pipeline_scheduler(config) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                light.stop();
                return Err(e.into());
            }
        };
        let intensive = match service.intensive_scheduler(config) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                light.stop();
                pipeline.stop();
                return Err(e.into());
            }
        };

        tracing::debug!(pipeline = %self.pipeline, prefix = config.prefix(), "schedulers acquired");
        Ok(Schedulers {
            light,
            pipeline,
            intensive,
        })
    }

    fn handle_context(&self, stage: Arc<dyn Stage>, schedulers: &Schedulers) -> HandleContext {
        HandleContext {
            stage,
            scheduler: Arc::clone(&schedulers.light),
            admission: self.admission.clone(),
            metrics: Arc::clone(&self.metrics),
            retry_interval: self.settings.retry_interval,
        }
    }

    fn synchronous_sink(&self, name: String, stage: Arc<dyn Stage>) -> Arc<dyn EventSink> {
        match self.profile.ingress() {
            Ingress::PerThread => {
                let metrics = Arc::clone(&self.metrics);
                let sink_name = name.clone();
                let supplier: SinkSupplier = Box::new(move || {
                    let sink = DirectSink::new(sink_name.as_str(), Arc::clone(&stage), Arc::clone(&metrics));
                    Ok(Arc::new(sink) as Arc<dyn EventSink>)
                });
                Arc::new(PerThreadSink::new(name, supplier))
            }
            // Profile::for_kind never yields a synchronous pooled profile
            Ingress::PerCall | Ingress::Pooled => {
                Arc::new(DirectSink::new(name, stage, Arc::clone(&self.metrics)))
            }
        }
    }

    fn asynchronous_sink(&self, name: String, stage: Arc<dyn Stage>) -> Result<Arc<dyn EventSink>> {
        let schedulers = self.ensure_schedulers()?;

        let provider: Arc<dyn IngressProvider> = match self.profile.ingress() {
            Ingress::PerCall => {
                return Ok(Arc::new(PerEventSink::new(
                    name,
                    self.handle_context(stage, &schedulers),
                    Arc::clone(&self.availability),
                    Arc::clone(&self.dispatching),
                )));
            }
            Ingress::PerThread => Arc::new(CachedThreadIngressProvider::new(
                format!("{}.cached", name),
                self.settings.buffer_size,
                self.handle_context(stage, &schedulers),
            )),
            Ingress::Pooled => Arc::new(EmitterPool::new(
                format!("{}.emitter", name),
                self.settings.subscriber_count,
                self.settings.buffer_size,
                self.handle_context(stage, &schedulers),
            )),
        };

        self.providers.lock().push(Arc::clone(&provider));
        Ok(Arc::new(ProvidedSink::new(
            name,
            provider,
            Arc::clone(&self.availability),
        )))
    }

    fn drainer(&self) -> Drainer {
        Drainer::new(
            self.pipeline.as_str(),
            *self.shutdown_timeout.read(),
            self.settings.drain_poll_interval,
            self.context.cancellation().clone(),
            Arc::clone(self.context.diagnostics()),
        )
    }

    /// Primary sink that internal streams feed into
    fn primary_sink(&self) -> Result<Arc<dyn EventSink>> {
        self.sinks.lock().first().cloned().ok_or_else(|| {
            StrategyError::invalid_state(self.pipeline.as_str(), "no sink has been created")
        })
    }
}

impl ProcessingStrategy for PipelineStrategy {
    fn on_processor(&self, stage: Arc<dyn Stage>) -> Arc<dyn Stage> {
        if self.profile.is_synchronous() {
            return stage;
        }

        let target = match stage.processing_type() {
            ProcessingType::Blocking | ProcessingType::IoRw => SchedulerKind::Pipeline,
            ProcessingType::CpuIntensive => SchedulerKind::Intensive,
            ProcessingType::CpuLite | ProcessingType::CpuLiteAsync => return stage,
        };

        tracing::trace!(pipeline = %self.pipeline, stage = stage.name(), %target, "stage scheduled");
        Arc::new(ScheduledStage::new(
            stage,
            target,
            Arc::clone(&self.schedulers),
            self.admission.clone(),
            self.settings.retry_interval,
        ))
    }

    fn create_sink(&self, owner: &PipelineOwner, stage: Arc<dyn Stage>) -> Result<Arc<dyn EventSink>> {
        if self.is_disposed() {
            return Err(self.closed_error());
        }
        *self.shutdown_timeout.write() = owner.shutdown_timeout();

        let name = format!("{}.sink", owner.name());
        let sink = if self.profile.is_synchronous() {
            self.synchronous_sink(name, stage)
        } else {
            self.asynchronous_sink(name, stage)?
        };

        tracing::debug!(pipeline = %self.pipeline, sink = sink.name(), kind = %self.kind, "sink created");
        self.sinks.lock().push(Arc::clone(&sink));
        Ok(sink)
    }

    fn check_backpressure_accepting(&self, event: &Event) -> Result<()> {
        if self.profile.is_synchronous() {
            return Ok(());
        }
        self.admission.check_accepting(event)
    }

    fn check_backpressure_emitting(&self, event: &Event) -> Option<BackPressureReason> {
        if self.profile.is_synchronous() {
            return None;
        }
        self.admission.check_emitting(event)
    }

    fn register_internal_sink(&self, stream: EventStream, name: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(self.closed_error());
        }

        let sink = self.primary_sink()?;
        let stream = self.configure_internal_publisher(stream);
        let thread_name = format!("{}.internal.{}", self.scheduler_config.prefix(), name);
        let guard = ActiveGuard::new(Arc::clone(&self.internal_active));
        let pipeline = self.pipeline.clone();
        let sink_name = name.to_string();

        thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _guard = guard;
                let mut delivered = 0u64;
                for event in stream {
                    let context = Arc::clone(event.context());
                    if let Err(e) = sink.accept(event) {
                        tracing::debug!(pipeline = %pipeline, internal = %sink_name, error = %e, "internal event refused");
                        context.fail(e.to_string());
                    }
                    delivered += 1;
                }
                tracing::debug!(pipeline = %pipeline, internal = %sink_name, delivered, "internal sink finished");
            })
            .map_err(|e| StrategyError::invalid_state(self.pipeline.as_str(), format!("failed to spawn internal sink '{}': {}", name, e)))?;

        Ok(())
    }

    fn is_synchronous(&self) -> bool {
        self.profile.is_synchronous()
    }

    fn configure_internal_publisher(&self, stream: EventStream) -> EventStream {
        if self.profile.is_synchronous() {
            return stream;
        }
        Box::new(AdmittedStream {
            inner: stream,
            admission: self.admission.clone(),
            done: false,
        })
    }

    fn metrics_handle(&self) -> Arc<StrategyMetrics> {
        Arc::clone(&self.metrics)
    }

    fn as_lifecycle(&self) -> Option<&dyn Lifecycle> {
        if self.profile.is_lifecycle_managed() {
            Some(self)
        } else {
            None
        }
    }
}

impl Lifecycle for PipelineStrategy {
    fn initialise(&self) -> Result<()> {
        if self.profile.is_synchronous() {
            return Ok(());
        }
        // Recorded; create_sink reports it
        if let Err(e) = self.ensure_schedulers() {
            tracing::error!(pipeline = %self.pipeline, error = %e, "failed to acquire schedulers");
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(self.closed_error());
        }
        self.availability.set_running(true);
        tracing::debug!(pipeline = %self.pipeline, "strategy started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.availability.set_running(false);
        tracing::debug!(pipeline = %self.pipeline, "strategy stopped");
        Ok(())
    }

    fn dispose(&self) -> DrainOutcome {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return DrainOutcome::Drained;
        }

        self.admission.close();
        let sinks: Vec<_> = self.sinks.lock().drain(..).collect();
        for sink in &sinks {
            sink.dispose();
        }

        // Keep the providers so the drain can observe their handles
        let providers = self.providers.lock().clone();
        for provider in &providers {
            provider.close();
        }

        let internal = Arc::clone(&self.internal_active);
        let dispatching = Arc::clone(&self.dispatching);
        let outcome = self.drainer().drain(self.kind.as_str(), || {
            providers.iter().map(|p| p.active_handles()).sum::<usize>()
                + internal.load(Ordering::SeqCst)
                + dispatching.load(Ordering::SeqCst)
        });

        if let Some(schedulers) = self.schedulers.write().take() {
            schedulers.stop();
        }
        self.providers.lock().clear();

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            pipeline = %self.pipeline,
            kind = %self.kind,
            %outcome,
            completed = snapshot.completed,
            failed = snapshot.failed,
            rejected = snapshot.rejected(),
            "strategy disposed"
        );
        outcome
    }
}

impl std::fmt::Debug for PipelineStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStrategy")
            .field("pipeline", &self.pipeline)
            .field("kind", &self.kind)
            .field("profile", &self.profile)
            .field("admission", &self.admission)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Yields events only once admission let them in
struct AdmittedStream {
    inner: EventStream,
    admission: Admission,
    done: bool,
}

impl Iterator for AdmittedStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.done {
            return None;
        }
        let event = self.inner.next()?;
        match self.admission.check_accepting(&event) {
            Ok(()) => Some(event),
            Err(e) => {
                // Admission closed: the strategy is going away
                event.context().fail(e.to_string());
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
