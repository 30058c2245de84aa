//! Ingress handles and the providers that pool them
//!
//! An [`IngressHandle`] is a bounded queue serviced by drain tasks on the
//! light scheduler. At most one drain task per handle runs at a time, so
//! events pushed from one thread reach the stage in push order.
//!
//! Providers decide how handles are handed out:
//! - [`CachedThreadIngressProvider`]: one handle per calling thread
//! - [`EmitterPool`]: a fixed set, each thread pinned to one handle
//!
//! Both count active handles. Closing a provider closes its handles; a
//! closed handle stops counting as active once its queue is empty, so the
//! count only goes down during a drain.

mod cached_thread;
mod emitter;
mod handle;

pub use cached_thread::CachedThreadIngressProvider;
pub use emitter::EmitterPool;
pub use handle::IngressHandle;
pub(crate) use handle::HandleContext;

use std::sync::Arc;

use crate::drain::{DrainOutcome, Drainer};
use crate::error::Result;

#[cfg(test)]
#[path = "ingress_test.rs"]
mod tests;

/// Allocates, caches and drains ingress handles
pub trait IngressProvider: Send + Sync {
    /// Provider name (for logging and errors)
    fn name(&self) -> &str;

    /// Handle for the calling thread
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::SinkClosed` once the provider is closed.
    fn handle(&self) -> Result<Arc<IngressHandle>>;

    /// Handles that may still deliver events
    fn active_handles(&self) -> usize;

    /// Stop handing out handles and close the existing ones; idempotent
    fn close(&self);

    /// Close, then wait for the active count to reach zero within the
    /// drainer's bounds
    fn dispose(&self, drainer: &Drainer) -> DrainOutcome {
        self.close();
        drainer.drain(self.name(), || self.active_handles())
    }
}
