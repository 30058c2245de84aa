//! Scheduler pool configuration
//!
//! Sizing for the three thread pools a pipeline may use:
//! - `light`: short non-blocking dispatch, buffers instead of rejecting
//! - `pipeline`: blocking and IO-bound stages, rejects when its queue is full
//! - `intensive`: CPU-bound stages, rejects when its queue is full

use serde::Deserialize;

/// Sizing for one thread pool
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads
    pub threads: usize,

    /// Queue capacity; unset means the queue never rejects
    pub queue_size: Option<usize>,
}

impl PoolConfig {
    /// Pool with a bounded queue
    pub fn bounded(threads: usize, queue_size: usize) -> Self {
        Self {
            threads,
            queue_size: Some(queue_size),
        }
    }

    /// Pool whose queue buffers without bound
    pub fn unbounded(threads: usize) -> Self {
        Self {
            threads,
            queue_size: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::unbounded(num_cpus())
    }
}

/// Scheduler configuration
///
/// # Example
///
/// ```toml
/// [schedulers]
/// artifact = "orders-app"
///
/// [schedulers.pipeline]
/// threads = 8
/// queue_size = 512
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulersConfig {
    /// Owning artifact; prefixes every scheduler thread name
    /// Default: "weir"
    pub artifact: String,

    /// Light pool; always buffers, `queue_size` is not accepted here
    /// Default: CPU count threads
    pub light: PoolConfig,

    /// Pipeline (blocking) pool
    /// Default: 2 x CPU count threads, 1024 queued tasks
    pub pipeline: PoolConfig,

    /// CPU-intensive pool
    /// Default: CPU count threads, 1024 queued tasks
    pub intensive: PoolConfig,
}

impl Default for SchedulersConfig {
    fn default() -> Self {
        Self {
            artifact: "weir".into(),
            light: PoolConfig::unbounded(num_cpus()),
            pipeline: PoolConfig::bounded(num_cpus() * 2, 1024),
            intensive: PoolConfig::bounded(num_cpus(), 1024),
        }
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
