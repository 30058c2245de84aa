//! Test utilities for strategies
//!
//! Real schedulers and real sinks; the helpers only record what happened so
//! tests can assert on drain diagnostics, scheduler stop order and stage
//! threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use weir_config::{PoolConfig, SchedulersConfig};
use weir_scheduler::{
    PooledSchedulerService, Scheduler, SchedulerConfig, SchedulerError, SchedulerKind,
    SchedulerService, SubmitError, Task,
};

use crate::drain::{DrainDiagnostics, DrainOutcome};
use crate::event::Event;
use crate::stage::{ProcessingType, Stage, StageResult};
use crate::strategy::StrategyContext;

/// Small pools under the `test` artifact
pub fn small_scheduler_config() -> SchedulerConfig {
    SchedulerConfig::from_config(&SchedulersConfig {
        artifact: "test".into(),
        light: PoolConfig::unbounded(2),
        pipeline: PoolConfig::bounded(2, 64),
        intensive: PoolConfig::bounded(1, 64),
    })
}

/// Context over a recording scheduler service and recording diagnostics
pub fn test_context() -> (StrategyContext, Arc<RecordingSchedulerService>, Arc<RecordingDiagnostics>) {
    let service = Arc::new(RecordingSchedulerService::new());
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let context = StrategyContext::new(service.clone(), small_scheduler_config())
        .with_diagnostics(diagnostics.clone());
    (context, service, diagnostics)
}

/// Records every incomplete-drain report
#[derive(Default)]
pub struct RecordingDiagnostics {
    reports: Mutex<Vec<(String, DrainOutcome)>>,
}

impl RecordingDiagnostics {
    /// Number of reports
    pub fn calls(&self) -> usize {
        self.reports.lock().len()
    }

    /// Reported outcomes, in order
    pub fn outcomes(&self) -> Vec<DrainOutcome> {
        self.reports.lock().iter().map(|(_, o)| *o).collect()
    }
}

impl DrainDiagnostics for RecordingDiagnostics {
    fn incomplete_drain(&self, pipeline: &str, _component: &str, outcome: &DrainOutcome) {
        self.reports.lock().push((pipeline.to_string(), *outcome));
    }
}

/// Scheduler service that records stops and can refuse one scheduler kind
pub struct RecordingSchedulerService {
    inner: PooledSchedulerService,
    stops: Arc<Mutex<Vec<SchedulerKind>>>,
    failing: Option<SchedulerKind>,
    /// Kind whose schedulers reject every submission
    refusing: Arc<Mutex<Option<SchedulerKind>>>,
}

impl RecordingSchedulerService {
    /// Service handing out real thread pools
    pub fn new() -> Self {
        Self {
            inner: PooledSchedulerService::new(),
            stops: Arc::new(Mutex::new(Vec::new())),
            failing: None,
            refusing: Arc::new(Mutex::new(None)),
        }
    }

    /// Service whose `kind` scheduler cannot be acquired
    pub fn failing(kind: SchedulerKind) -> Self {
        Self {
            failing: Some(kind),
            ..Self::new()
        }
    }

    /// Scheduler kinds in the order they were stopped
    pub fn stops(&self) -> Vec<SchedulerKind> {
        self.stops.lock().clone()
    }

    /// Make schedulers of `kind` reject submissions; `None` accepts again
    pub fn refuse(&self, kind: Option<SchedulerKind>) {
        *self.refusing.lock() = kind;
    }

    /// Schedulers handed out so far
    pub fn acquired(&self) -> usize {
        self.inner.scheduler_count()
    }

    fn acquire(
        &self,
        kind: SchedulerKind,
        config: &SchedulerConfig,
    ) -> weir_scheduler::Result<Arc<dyn Scheduler>> {
        if self.failing == Some(kind) {
            return Err(SchedulerError::unavailable(
                config.scheduler_name(kind),
                "refused by test service",
            ));
        }
        let inner = match kind {
            SchedulerKind::Light => self.inner.light_scheduler(config)?,
            SchedulerKind::Pipeline => self.inner.pipeline_scheduler(config)?,
            SchedulerKind::Intensive => self.inner.intensive_scheduler(config)?,
        };
        Ok(Arc::new(RecordingScheduler {
            kind,
            inner,
            stops: Arc::clone(&self.stops),
            refusing: Arc::clone(&self.refusing),
        }))
    }
}

impl Default for RecordingSchedulerService {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerService for RecordingSchedulerService {
    fn light_scheduler(&self, config: &SchedulerConfig) -> weir_scheduler::Result<Arc<dyn Scheduler>> {
        self.acquire(SchedulerKind::Light, config)
    }

    fn pipeline_scheduler(&self, config: &SchedulerConfig) -> weir_scheduler::Result<Arc<dyn Scheduler>> {
        self.acquire(SchedulerKind::Pipeline, config)
    }

    fn intensive_scheduler(&self, config: &SchedulerConfig) -> weir_scheduler::Result<Arc<dyn Scheduler>> {
        self.acquire(SchedulerKind::Intensive, config)
    }
}

#[derive(Debug)]
struct RecordingScheduler {
    kind: SchedulerKind,
    inner: Arc<dyn Scheduler>,
    stops: Arc<Mutex<Vec<SchedulerKind>>>,
    refusing: Arc<Mutex<Option<SchedulerKind>>>,
}

impl Scheduler for RecordingScheduler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if *self.refusing.lock() == Some(self.kind) {
            return Err(SubmitError::Rejected(task));
        }
        self.inner.submit(task)
    }

    fn is_current_thread(&self) -> bool {
        self.inner.is_current_thread()
    }

    fn stop(&self) {
        if !self.inner.is_stopped() {
            self.stops.lock().push(self.kind);
        }
        self.inner.stop();
    }

    fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    fn active_workers(&self) -> usize {
        self.inner.active_workers()
    }
}

/// Scheduler that turns every task away
#[derive(Debug)]
pub struct RefusingScheduler;

impl Scheduler for RefusingScheduler {
    fn name(&self) -> &str {
        "test.refusing"
    }

    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        Err(SubmitError::Rejected(task))
    }

    fn is_current_thread(&self) -> bool {
        false
    }

    fn stop(&self) {}

    fn is_stopped(&self) -> bool {
        false
    }

    fn active_workers(&self) -> usize {
        0
    }
}

/// Stage that blocks every event until opened
pub struct GateStage {
    name: String,
    processing_type: ProcessingType,
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl GateStage {
    /// Closed gate
    pub fn new(name: impl Into<String>, processing_type: ProcessingType) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            processing_type,
            open: Mutex::new(false),
            opened: Condvar::new(),
            entered: AtomicUsize::new(0),
        })
    }

    /// Let every waiting and future event through
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Events that reached the stage
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl Stage for GateStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> StageResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        Ok(event)
    }
}

/// Stage recording the name of the thread each event ran on
pub struct ThreadRecordingStage {
    name: String,
    processing_type: ProcessingType,
    threads: Mutex<Vec<String>>,
}

impl ThreadRecordingStage {
    /// Recording stage of the given type
    pub fn new(name: impl Into<String>, processing_type: ProcessingType) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            processing_type,
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Thread names, in processing order
    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }

    /// Events processed
    pub fn calls(&self) -> usize {
        self.threads.lock().len()
    }
}

impl Stage for ThreadRecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> StageResult {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        self.threads.lock().push(name);
        Ok(event)
    }
}

/// Poll `cond` every 2ms; panics after 5s
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}
