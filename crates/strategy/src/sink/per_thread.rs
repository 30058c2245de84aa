//! Thread-affine sink

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::EventSink;
use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;

/// Builds a downstream sink for the calling thread
pub type SinkSupplier = Box<dyn Fn() -> Result<Arc<dyn EventSink>> + Send + Sync>;

/// Lazily builds and caches one downstream sink per calling thread
///
/// The supplier runs without the cache lock held. A supplier failure
/// surfaces as `StrategyError::InvalidState`; it is never swallowed.
pub struct PerThreadSink {
    name: String,
    supplier: SinkSupplier,
    sinks: Mutex<HashMap<ThreadId, Arc<dyn EventSink>>>,
    disposed: AtomicBool,
}

impl PerThreadSink {
    /// Create a sink that builds downstream sinks with `supplier`
    pub fn new(name: impl Into<String>, supplier: SinkSupplier) -> Self {
        Self {
            name: name.into(),
            supplier,
            sinks: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of threads with a cached sink
    pub fn cached_threads(&self) -> usize {
        self.sinks.lock().len()
    }

    fn current(&self) -> Result<Arc<dyn EventSink>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StrategyError::closed(self.name.as_str()));
        }

        let thread = thread::current().id();
        if let Some(sink) = self.sinks.lock().get(&thread) {
            return Ok(Arc::clone(sink));
        }

        let sink = (self.supplier)()
            .map_err(|e| StrategyError::invalid_state(self.name.as_str(), e.to_string()))?;

        let mut sinks = self.sinks.lock();
        if self.disposed.load(Ordering::SeqCst) {
            drop(sinks);
            sink.dispose();
            return Err(StrategyError::closed(self.name.as_str()));
        }
        // Only this thread inserts under its own id
        Ok(Arc::clone(sinks.entry(thread).or_insert(sink)))
    }
}

impl EventSink for PerThreadSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, event: Event) -> Result<()> {
        self.current()?.accept(event)
    }

    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>> {
        self.current()?.emit(event)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sinks: Vec<_> = self.sinks.lock().drain().map(|(_, sink)| sink).collect();
        tracing::debug!(sink = %self.name, threads = sinks.len(), "per-thread sink disposed");
        for sink in sinks {
            sink.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
