//! Emitter pool
//!
//! A fixed set of ingress handles created up front. Each calling thread is
//! assigned a handle round robin on its first emission and keeps it, which
//! keeps that thread's events in order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use super::IngressProvider;
use super::handle::{HandleContext, IngressHandle};
use crate::error::{Result, StrategyError};

/// Fixed pool of ingress handles with per-thread round-robin assignment
pub struct EmitterPool {
    name: String,
    handles: Vec<Arc<IngressHandle>>,
    /// Handle index per thread
    assignments: RwLock<HashMap<ThreadId, usize>>,
    /// Counter for round-robin assignment
    next_assignment: AtomicU64,
    active: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl EmitterPool {
    /// `handle_count` handles sharing `buffer_size` slots between them
    pub(crate) fn new(
        name: impl Into<String>,
        handle_count: usize,
        buffer_size: usize,
        ctx: HandleContext,
    ) -> Self {
        let name = name.into();
        let handle_count = handle_count.max(1);
        let capacity = (buffer_size / handle_count).max(1);
        let active = Arc::new(AtomicUsize::new(0));

        let handles = (0..handle_count)
            .map(|index| {
                IngressHandle::new(
                    format!("{}.{}", name, index),
                    capacity,
                    Arc::clone(&active),
                    ctx.clone(),
                )
            })
            .collect();

        tracing::debug!(pool = %name, handles = handle_count, capacity, "emitter pool created");

        Self {
            name,
            handles,
            assignments: RwLock::new(HashMap::new()),
            next_assignment: AtomicU64::new(0),
            active,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of handles in the pool
    #[inline]
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Index of the handle serving the calling thread
    pub fn assigned_index(&self) -> usize {
        let thread = thread::current().id();
        if let Some(index) = self.assignments.read().get(&thread) {
            return *index;
        }

        let mut assignments = self.assignments.write();
        *assignments.entry(thread).or_insert_with(|| {
            let next = self.next_assignment.fetch_add(1, Ordering::Relaxed);
            (next as usize) % self.handles.len()
        })
    }
}

impl IngressProvider for EmitterPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> Result<Arc<IngressHandle>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StrategyError::closed(self.name.as_str()));
        }
        Ok(Arc::clone(&self.handles[self.assigned_index()]))
    }

    fn active_handles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(pool = %self.name, handles = self.handles.len(), "closing emitter pool");
        for handle in &self.handles {
            handle.close();
        }
    }
}

impl std::fmt::Debug for EmitterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterPool")
            .field("name", &self.name)
            .field("handles", &self.handles.len())
            .field("active", &self.active_handles())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
