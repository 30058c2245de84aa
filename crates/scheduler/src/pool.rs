//! Thread-pool scheduler
//!
//! A fixed set of named worker threads consuming a shared MPMC queue.
//!
//! # Design
//!
//! - Bounded queues reject with [`SubmitError::Rejected`] when full; the light
//!   pool uses an unbounded queue and only rejects once stopped
//! - `stop()` drops the queue's sender: workers finish what is already queued
//!   and exit, nothing new is accepted
//! - A panicking task is logged and the worker keeps running

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossfire::{MRx, MTx, TrySendError};
use parking_lot::RwLock;
use weir_config::PoolConfig;

use crate::error::{Result, SchedulerError, SubmitError};
use crate::{Scheduler, Task};

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;

/// Scheduler backed by dedicated OS threads
pub struct ThreadPoolScheduler {
    /// Scheduler name, also the worker thread name prefix
    name: String,

    /// Queue sender; `None` once stopped
    sender: RwLock<Option<MTx<Task>>>,

    /// Worker thread identities, for `is_current_thread`
    workers: Vec<ThreadId>,

    /// Workers still running
    live_workers: Arc<AtomicUsize>,

    /// Configured capacity (`None` = unbounded)
    capacity: Option<usize>,
}

impl ThreadPoolScheduler {
    /// Spawn a pool sized by `config`
    ///
    /// Threads are named `{name}.{index:02}`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if a worker thread cannot be created.
    pub fn new(name: impl Into<String>, config: &PoolConfig) -> Result<Self> {
        let name = name.into();
        let (tx, rx) = match config.queue_size {
            Some(capacity) => crossfire::mpmc::bounded_blocking::<Task>(capacity),
            None => crossfire::mpmc::unbounded_blocking::<Task>(),
        };

        let live_workers = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(config.threads);

        for index in 0..config.threads.max(1) {
            let rx = rx.clone();
            let live = Arc::clone(&live_workers);
            let worker_name = format!("{}.{:02}", name, index);

            live.fetch_add(1, Ordering::SeqCst);
            let handle = thread::Builder::new()
                .name(worker_name)
                .spawn(move || worker_loop(rx, live))
                .map_err(|source| {
                    live_workers.fetch_sub(1, Ordering::SeqCst);
                    SchedulerError::Spawn {
                        scheduler: name.clone(),
                        source,
                    }
                })?;
            workers.push(handle.thread().id());
        }

        tracing::debug!(
            scheduler = %name,
            threads = workers.len(),
            capacity = ?config.queue_size,
            "scheduler started"
        );

        Ok(Self {
            name,
            sender: RwLock::new(Some(tx)),
            workers,
            live_workers,
            capacity: config.queue_size,
        })
    }

    /// Number of worker threads spawned
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue capacity, `None` when unbounded
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Wait until every worker has exited or `timeout` elapses
    ///
    /// Returns true if all workers exited.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.live_workers.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, task: Task) -> std::result::Result<(), SubmitError> {
        let guard = self.sender.read();
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::Stopped(task));
        };

        tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => SubmitError::Rejected(task),
            TrySendError::Disconnected(task) => SubmitError::Stopped(task),
        })
    }

    fn is_current_thread(&self) -> bool {
        let current = thread::current().id();
        self.workers.contains(&current)
    }

    fn stop(&self) {
        if self.sender.write().take().is_some() {
            tracing::debug!(scheduler = %self.name, "scheduler stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.sender.read().is_none()
    }

    fn active_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolScheduler")
            .field("name", &self.name)
            .field("threads", &self.workers.len())
            .field("capacity", &self.capacity)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Run tasks until the queue is closed and empty
fn worker_loop(rx: MRx<Task>, live: Arc<AtomicUsize>) {
    while let Ok(task) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(
                worker = thread::current().name().unwrap_or("unnamed"),
                "scheduled task panicked"
            );
        }
    }
    live.fetch_sub(1, Ordering::SeqCst);
}
