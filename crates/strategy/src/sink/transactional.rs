//! Transaction-aware sink

use std::sync::Arc;

use super::{DirectSink, EventSink};
use crate::backpressure::BackPressureReason;
use crate::error::Result;
use crate::event::Event;

/// Sends transactional events through a direct sink on the calling thread
/// and everything else to the delegate
pub struct TransactionAwareSink {
    name: String,
    direct: DirectSink,
    delegate: Arc<dyn EventSink>,
}

impl TransactionAwareSink {
    pub(crate) fn new(name: impl Into<String>, direct: DirectSink, delegate: Arc<dyn EventSink>) -> Self {
        Self {
            name: name.into(),
            direct,
            delegate,
        }
    }
}

impl EventSink for TransactionAwareSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, event: Event) -> Result<()> {
        if event.is_transactional() {
            self.direct.accept(event)
        } else {
            self.delegate.accept(event)
        }
    }

    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>> {
        if event.is_transactional() {
            self.direct.emit(event)
        } else {
            self.delegate.emit(event)
        }
    }

    fn dispose(&self) {
        self.direct.dispose();
        self.delegate.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.direct.is_disposed() && self.delegate.is_disposed()
    }
}
