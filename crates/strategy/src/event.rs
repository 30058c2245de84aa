//! Events and their completion hooks
//!
//! An [`Event`] is a cheap-to-clone handle: the payload is `Bytes` and the
//! completion state lives in a shared [`EventContext`]. Whichever path
//! finishes the event (synchronous or asynchronous, success or failure)
//! completes the context once; every registered hook fires exactly once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Final state of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Processed; carries the response payload
    Completed(Bytes),
    /// Failed or rejected; carries the reason
    Failed(String),
}

impl Outcome {
    /// True for `Completed`
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

type Hook = Box<dyn FnOnce(&Outcome) + Send + 'static>;

#[derive(Default)]
struct ContextState {
    outcome: Option<Outcome>,
    hooks: Vec<Hook>,
}

/// Completion state shared by every clone of an event
pub struct EventContext {
    id: u64,
    state: Mutex<ContextState>,
}

impl EventContext {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(ContextState::default()),
        }
    }

    /// Event id this context belongs to
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a hook that fires once when the event completes
    ///
    /// If the event already completed, the hook runs immediately on the
    /// calling thread.
    pub fn on_complete<F>(&self, hook: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let mut state = self.state.lock();
        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                hook(&outcome);
            }
            None => state.hooks.push(Box::new(hook)),
        }
    }

    /// Complete with a response payload
    ///
    /// Returns false if the event was already completed.
    pub fn complete(&self, response: Bytes) -> bool {
        self.finish(Outcome::Completed(response))
    }

    /// Complete with a failure
    ///
    /// Returns false if the event was already completed.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.finish(Outcome::Failed(reason.into()))
    }

    /// Whether an outcome has been recorded
    pub fn is_completed(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Recorded outcome, if any
    pub fn outcome(&self) -> Option<Outcome> {
        self.state.lock().outcome.clone()
    }

    fn finish(&self, outcome: Outcome) -> bool {
        let hooks = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.hooks)
        };

        // Hooks run with the lock released
        for hook in hooks {
            hook(&outcome);
        }
        true
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventContext")
            .field("id", &self.id)
            .field("outcome", &state.outcome)
            .field("pending_hooks", &state.hooks.len())
            .finish()
    }
}

/// Unit of work flowing through a pipeline
#[derive(Clone)]
pub struct Event {
    payload: Bytes,
    transaction: Option<u64>,
    context: Arc<EventContext>,
}

impl Event {
    /// Create an event with a fresh id
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let id = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            payload: payload.into(),
            transaction: None,
            context: Arc::new(EventContext::new(id)),
        }
    }

    /// Bind this event to a transaction
    pub fn in_transaction(mut self, transaction_id: u64) -> Self {
        self.transaction = Some(transaction_id);
        self
    }

    /// Same event (same context) with a different payload
    pub fn with_payload(self, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..self
        }
    }

    /// Event id
    #[inline]
    pub fn id(&self) -> u64 {
        self.context.id
    }

    /// Payload bytes
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Transaction this event is bound to
    #[inline]
    pub fn transaction(&self) -> Option<u64> {
        self.transaction
    }

    /// True when bound to a transaction
    #[inline]
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    /// Shared completion state
    #[inline]
    pub fn context(&self) -> &Arc<EventContext> {
        &self.context
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id())
            .field("payload_len", &self.payload.len())
            .field("transaction", &self.transaction)
            .finish()
    }
}
