//! Scheduler provider
//!
//! Hands out schedulers keyed by a [`SchedulerConfig`] derived from the owning
//! artifact and pipeline.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use weir_config::{PoolConfig, SchedulersConfig};

use crate::error::{Result, SchedulerError};
use crate::pool::ThreadPoolScheduler;
use crate::Scheduler;

/// Which pool a scheduler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    /// Short non-blocking dispatch
    Light,
    /// Blocking and IO-bound work
    Pipeline,
    /// CPU-bound work
    Intensive,
}

impl SchedulerKind {
    /// Name used in thread names and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Pipeline => "pipeline",
            Self::Intensive => "intensive",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler configuration for one owner
///
/// The prefix names every worker thread: `{artifact}.{pipeline}.{kind}.{n}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    prefix: String,
    light: PoolConfig,
    pipeline: PoolConfig,
    intensive: PoolConfig,
}

impl SchedulerConfig {
    /// Build from the `[schedulers]` section; the artifact becomes the prefix
    pub fn from_config(config: &SchedulersConfig) -> Self {
        Self {
            prefix: config.artifact.clone(),
            light: PoolConfig::unbounded(config.light.threads),
            pipeline: config.pipeline.clone(),
            intensive: config.intensive.clone(),
        }
    }

    /// Derive the configuration for a pipeline of this artifact
    pub fn for_pipeline(&self, pipeline: &str) -> Self {
        Self {
            prefix: format!("{}.{}", self.prefix, pipeline),
            ..self.clone()
        }
    }

    /// Thread name prefix
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sizing for a pool
    pub fn pool(&self, kind: SchedulerKind) -> &PoolConfig {
        match kind {
            SchedulerKind::Light => &self.light,
            SchedulerKind::Pipeline => &self.pipeline,
            SchedulerKind::Intensive => &self.intensive,
        }
    }

    /// Full scheduler name for a pool
    pub fn scheduler_name(&self, kind: SchedulerKind) -> String {
        format!("{}.{}", self.prefix, kind)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&SchedulersConfig::default())
    }
}

/// Provider of schedulers
///
/// Every call returns a scheduler owned by the caller, who stops it when done.
pub trait SchedulerService: Send + Sync {
    /// Scheduler for short non-blocking dispatch
    fn light_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>>;

    /// Scheduler for blocking and IO-bound stages
    fn pipeline_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>>;

    /// Scheduler for CPU-bound stages
    fn intensive_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>>;
}

/// Service that builds a fresh [`ThreadPoolScheduler`] per request
///
/// Keeps track of what it created so `shutdown()` can stop leftovers.
#[derive(Default)]
pub struct PooledSchedulerService {
    created: Mutex<Vec<Arc<ThreadPoolScheduler>>>,
    shut_down: AtomicBool,
}

impl PooledSchedulerService {
    /// Create a new service
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every scheduler created so far and refuse further requests
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let created = std::mem::take(&mut *self.created.lock());
        for scheduler in &created {
            scheduler.stop();
        }
        tracing::debug!(schedulers = created.len(), "scheduler service shut down");
    }

    /// Number of schedulers handed out and not yet shut down
    pub fn scheduler_count(&self) -> usize {
        self.created.lock().len()
    }

    fn build(&self, config: &SchedulerConfig, kind: SchedulerKind) -> Result<Arc<dyn Scheduler>> {
        let name = config.scheduler_name(kind);
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::unavailable(name, "scheduler service is shut down"));
        }

        let scheduler = Arc::new(ThreadPoolScheduler::new(name, config.pool(kind))?);
        self.created.lock().push(Arc::clone(&scheduler));
        Ok(scheduler as Arc<dyn Scheduler>)
    }
}

impl SchedulerService for PooledSchedulerService {
    fn light_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>> {
        self.build(config, SchedulerKind::Light)
    }

    fn pipeline_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>> {
        self.build(config, SchedulerKind::Pipeline)
    }

    fn intensive_scheduler(&self, config: &SchedulerConfig) -> Result<Arc<dyn Scheduler>> {
        self.build(config, SchedulerKind::Intensive)
    }
}

impl fmt::Debug for PooledSchedulerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSchedulerService")
            .field("schedulers", &self.scheduler_count())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}
