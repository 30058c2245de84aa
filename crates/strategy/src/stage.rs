//! Processing stages
//!
//! A stage maps an event to an event and declares how it should be
//! scheduled. Strategies wrap stages (`on_processor`) without changing what
//! they compute, only where they run.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::event::Event;

/// How a stage expects to be scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProcessingType {
    /// Blocks the thread (user code, locks, sleeps)
    Blocking,
    /// Blocking IO; scheduled like `Blocking`
    IoRw,
    /// Short and non-blocking (default)
    #[default]
    CpuLite,
    /// Non-blocking, completes asynchronously
    CpuLiteAsync,
    /// Long-running CPU work
    CpuIntensive,
}

impl ProcessingType {
    /// True for stages that must not run on the light pool
    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking | Self::IoRw)
    }

    /// Name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::IoRw => "io_rw",
            Self::CpuLite => "cpu_lite",
            Self::CpuLiteAsync => "cpu_lite_async",
            Self::CpuIntensive => "cpu_intensive",
        }
    }
}

/// Failure raised by a stage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage '{stage}' failed: {message}")]
pub struct StageError {
    stage: String,
    message: String,
}

impl StageError {
    /// Create a stage error
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Stage that failed
    #[inline]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Failure message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for stage execution
pub type StageResult = std::result::Result<Event, StageError>;

/// A processing step of a pipeline
pub trait Stage: Send + Sync {
    /// Stage name (for logging and errors)
    fn name(&self) -> &str;

    /// Scheduling hint
    fn processing_type(&self) -> ProcessingType {
        ProcessingType::CpuLite
    }

    /// Process one event
    fn process(&self, event: Event) -> StageResult;
}

/// Stage that returns its input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityStage;

impl Stage for IdentityStage {
    fn name(&self) -> &str {
        "identity"
    }

    fn process(&self, event: Event) -> StageResult {
        Ok(event)
    }
}

/// Stage built from a closure
pub struct FnStage<F> {
    name: String,
    processing_type: ProcessingType,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(Event) -> StageResult + Send + Sync,
{
    /// Create a stage
    pub fn new(name: impl Into<String>, processing_type: ProcessingType, func: F) -> Self {
        Self {
            name: name.into(),
            processing_type,
            func,
        }
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(Event) -> StageResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> StageResult {
        (self.func)(event)
    }
}

impl<F> fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("processing_type", &self.processing_type)
            .finish()
    }
}

/// Ordered stages applied one after another
///
/// Fails fast: the first stage error is returned and later stages are
/// skipped.
#[derive(Clone, Default)]
pub struct StageChain {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageChain {
    /// Create a chain
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Number of stages
    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True if the chain has no stages
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Stage for StageChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn process(&self, event: Event) -> StageResult {
        self.stages
            .iter()
            .try_fold(event, |event, stage| stage.process(event))
    }
}

impl fmt::Debug for StageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageChain")
            .field("stages", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn upper() -> Arc<dyn Stage> {
        Arc::new(FnStage::new("upper", ProcessingType::CpuLite, |event: Event| {
            let upper = event.payload().to_ascii_uppercase();
            Ok(event.with_payload(upper))
        }))
    }

    fn failing() -> Arc<dyn Stage> {
        Arc::new(FnStage::new("fail", ProcessingType::Blocking, |_event: Event| {
            Err(StageError::new("fail", "always fails"))
        }))
    }

    #[test]
    fn test_identity_stage() {
        let event = Event::new("same");
        let out = IdentityStage.process(event.clone()).unwrap();
        assert_eq!(out.id(), event.id());
        assert_eq!(out.payload(), event.payload());
    }

    #[test]
    fn test_blocking_types() {
        assert!(ProcessingType::Blocking.is_blocking());
        assert!(ProcessingType::IoRw.is_blocking());
        assert!(!ProcessingType::CpuLite.is_blocking());
        assert!(!ProcessingType::CpuIntensive.is_blocking());
        assert_eq!(ProcessingType::default(), ProcessingType::CpuLite);
    }

    #[test]
    fn test_chain_applies_in_order() {
        let suffix: Arc<dyn Stage> =
            Arc::new(FnStage::new("suffix", ProcessingType::CpuLite, |event: Event| {
                let mut bytes = event.payload().to_vec();
                bytes.extend_from_slice(b"!");
                Ok(event.with_payload(bytes))
            }));
        let chain = StageChain::new(vec![upper(), suffix]);

        assert_eq!(chain.names(), vec!["upper", "suffix"]);
        let out = chain.process(Event::new("hi")).unwrap();
        assert_eq!(out.payload(), &Bytes::from_static(b"HI!"));
    }

    #[test]
    fn test_chain_fails_fast() {
        let chain = StageChain::new(vec![failing(), upper()]);
        let err = chain.process(Event::new("hi")).unwrap_err();
        assert_eq!(err.stage(), "fail");
        assert_eq!(err.message(), "always fails");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = StageChain::default();
        assert!(chain.is_empty());
        let out = chain.process(Event::new("x")).unwrap();
        assert_eq!(out.payload().as_ref(), b"x");
    }
}
