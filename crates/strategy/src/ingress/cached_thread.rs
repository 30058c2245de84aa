//! Cached-thread ingress provider

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::IngressProvider;
use super::handle::{HandleContext, IngressHandle};
use crate::error::{Result, StrategyError};

/// One ingress handle per calling thread, all feeding the same stage
///
/// Handles are created on a thread's first call and reused after that.
pub struct CachedThreadIngressProvider {
    name: String,
    capacity: usize,
    ctx: HandleContext,
    handles: Mutex<HashMap<ThreadId, Arc<IngressHandle>>>,
    active: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl CachedThreadIngressProvider {
    pub(crate) fn new(name: impl Into<String>, capacity: usize, ctx: HandleContext) -> Self {
        Self {
            name: name.into(),
            capacity,
            ctx,
            handles: Mutex::new(HashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of cached handles
    pub fn cached_handles(&self) -> usize {
        self.handles.lock().len()
    }
}

impl IngressProvider for CachedThreadIngressProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> Result<Arc<IngressHandle>> {
        let mut handles = self.handles.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(StrategyError::closed(self.name.as_str()));
        }

        let thread = thread::current().id();
        if let Some(handle) = handles.get(&thread) {
            return Ok(Arc::clone(handle));
        }

        let handle = IngressHandle::new(
            format!("{}.{}", self.name, handles.len()),
            self.capacity,
            Arc::clone(&self.active),
            self.ctx.clone(),
        );
        handles.insert(thread, Arc::clone(&handle));
        tracing::trace!(provider = %self.name, handles = handles.len(), "ingress handle created");
        Ok(handle)
    }

    fn active_handles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn close(&self) {
        let handles: Vec<_> = {
            let mut handles = self.handles.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            handles.drain().map(|(_, handle)| handle).collect()
        };

        tracing::debug!(provider = %self.name, handles = handles.len(), "closing ingress handles");
        for handle in &handles {
            handle.close();
        }
    }
}
