//! Strategy profiles
//!
//! A profile is the tagged configuration that distinguishes strategy
//! families: execution × ingress × admission check. Profiles only come
//! from [`Profile::for_kind`], which never pairs synchronous execution
//! with pooled ingress.

use weir_config::StrategyKind;

/// Where events run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// On the calling thread, without admission control
    Synchronous,
    /// On strategy-owned schedulers
    Asynchronous,
}

/// How a sink reaches the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    /// Every call dispatches on its own
    PerCall,
    /// One downstream per calling thread
    PerThread,
    /// Fixed pool of ingress handles
    Pooled,
}

/// When max concurrency is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionCheck {
    /// Refuse at emission once the maximum is reached
    Eager,
    /// Admit at emission, enforce only in blocking admission
    Lazy,
}

impl AdmissionCheck {
    /// Eager when `eager` is set
    pub fn from_flag(eager: bool) -> Self {
        if eager { Self::Eager } else { Self::Lazy }
    }

    /// True for `Eager`
    #[inline]
    pub fn is_eager(&self) -> bool {
        matches!(self, Self::Eager)
    }
}

/// Tagged strategy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    execution: Execution,
    ingress: Ingress,
    admission: AdmissionCheck,
}

impl Profile {
    /// Profile for a strategy kind
    ///
    /// Pooled ingress needs strategy-owned schedulers, so every pooled
    /// profile is asynchronous.
    pub fn for_kind(kind: StrategyKind, admission: AdmissionCheck) -> Self {
        let (execution, ingress) = match kind {
            StrategyKind::Direct => (Execution::Synchronous, Ingress::PerCall),
            StrategyKind::DirectPerThread => (Execution::Synchronous, Ingress::PerThread),
            StrategyKind::Stream => (Execution::Asynchronous, Ingress::PerCall),
            StrategyKind::CachedThread => (Execution::Asynchronous, Ingress::PerThread),
            StrategyKind::Emitter | StrategyKind::TransactionalEmitter => {
                (Execution::Asynchronous, Ingress::Pooled)
            }
        };
        Self {
            execution,
            ingress,
            admission,
        }
    }

    /// Execution tag
    #[inline]
    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Ingress tag
    #[inline]
    pub fn ingress(&self) -> Ingress {
        self.ingress
    }

    /// Admission tag
    #[inline]
    pub fn admission(&self) -> AdmissionCheck {
        self.admission
    }

    /// True for synchronous execution
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.execution == Execution::Synchronous
    }

    /// Asynchronous strategies own schedulers and need initialise/dispose
    #[inline]
    pub fn is_lifecycle_managed(&self) -> bool {
        self.execution == Execution::Asynchronous
    }
}
