//! Provider-backed sink

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Availability, EventSink, reject_transactional};
use crate::backpressure::BackPressureReason;
use crate::error::{Result, StrategyError};
use crate::event::Event;
use crate::ingress::IngressProvider;

/// Delegates every call to a handle obtained fresh from an ingress provider
///
/// Forwards whatever the handle signals. Disposing the sink closes the
/// provider; the bounded drain belongs to the owning strategy.
pub struct ProvidedSink {
    name: String,
    provider: Arc<dyn IngressProvider>,
    availability: Arc<Availability>,
    disposed: AtomicBool,
}

impl ProvidedSink {
    pub(crate) fn new(
        name: impl Into<String>,
        provider: Arc<dyn IngressProvider>,
        availability: Arc<Availability>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            availability,
            disposed: AtomicBool::new(false),
        }
    }

    fn check(&self, event: &Event) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StrategyError::closed(self.name.as_str()));
        }
        self.availability.check()?;
        reject_transactional(event)
    }
}

impl EventSink for ProvidedSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, event: Event) -> Result<()> {
        self.check(&event)?;
        self.provider.handle()?.accept(event)
    }

    fn emit(&self, event: Event) -> Result<Option<BackPressureReason>> {
        self.check(&event)?;
        self.provider.handle()?.emit(event)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.provider.close();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
