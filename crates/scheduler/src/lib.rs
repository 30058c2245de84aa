//! Weir Scheduler - Thread pools for processing strategies
//!
//! Strategies never spawn threads directly: they acquire schedulers from a
//! [`SchedulerService`] at initialisation and stop them at disposal.
//!
//! # Pools
//!
//! | Pool | Used for | Queue |
//! |------|----------|-------|
//! | light | ingress consumption, short non-blocking dispatch | unbounded |
//! | pipeline | blocking and IO-bound stages | bounded, rejects when full |
//! | intensive | CPU-bound stages | bounded, rejects when full |
//!
//! # Example
//!
//! ```ignore
//! let service = PooledSchedulerService::new();
//! let config = SchedulerConfig::from_config(&config.schedulers).for_pipeline("orders");
//! let pipeline = service.pipeline_scheduler(&config)?;
//! pipeline.submit(Box::new(|| do_blocking_work()))?;
//! ```

mod error;
mod pool;
mod service;

pub use error::{Result, SchedulerError, SubmitError};
pub use pool::ThreadPoolScheduler;
pub use service::{PooledSchedulerService, SchedulerConfig, SchedulerKind, SchedulerService};

/// Unit of work accepted by a scheduler
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Execution capacity supplied to strategies
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Scheduler name (used in logs and thread names)
    fn name(&self) -> &str;

    /// Queue a task without blocking
    ///
    /// # Errors
    ///
    /// Returns the task back inside `SubmitError::Rejected` when the queue is
    /// full, or `SubmitError::Stopped` after `stop()`.
    fn submit(&self, task: Task) -> std::result::Result<(), SubmitError>;

    /// True when called from one of this scheduler's worker threads
    fn is_current_thread(&self) -> bool;

    /// Stop accepting tasks; already queued tasks still run
    fn stop(&self);

    /// True once `stop()` was called
    fn is_stopped(&self) -> bool;

    /// Worker threads still running
    fn active_workers(&self) -> usize;
}
