//! Strategy factory
//!
//! Holds one strategy family's tunables and creates a strategy per
//! pipeline. Setters validate eagerly so a bad value fails at
//! configuration time, never when the pipeline starts.

use std::sync::Arc;
use std::time::Duration;

use weir_config::{
    ConfigError, DEFAULT_BUFFER_SIZE, DEFAULT_SUBSCRIBER_COUNT, StrategyConfig, StrategyKind,
    validate_strategy,
};

use crate::drain::ShutdownTimeout;
use crate::error::Result;
use crate::strategy::{
    AdmissionCheck, PipelineStrategy, ProcessingStrategy, Profile, Settings, StrategyContext,
    TransactionAwareStrategy,
};

#[cfg(test)]
#[path = "factory_test.rs"]
mod tests;

/// Pause before resubmitting a task a scheduler refused
pub const SCHEDULER_RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// Discriminator for the strategy family a factory produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyType {
    kind: StrategyKind,
    profile: Profile,
}

impl StrategyType {
    /// Strategy family
    #[inline]
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Tagged configuration
    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Strategies of this type must be initialised, started and disposed
    #[inline]
    pub fn is_lifecycle_managed(&self) -> bool {
        self.profile.is_lifecycle_managed()
    }
}

/// Builds processing strategies of one family
#[derive(Debug, Clone)]
pub struct StrategyFactory {
    kind: StrategyKind,
    buffer_size: usize,
    subscriber_count: usize,
    max_concurrency: Option<usize>,
    eager_check: bool,
    shutdown_timeout: Duration,
    drain_poll_interval: Duration,
    retry_interval: Duration,
}

impl StrategyFactory {
    /// Factory with default tunables
    pub fn new(kind: StrategyKind) -> Self {
        let defaults = StrategyConfig::default();
        Self {
            kind,
            buffer_size: DEFAULT_BUFFER_SIZE,
            subscriber_count: DEFAULT_SUBSCRIBER_COUNT,
            max_concurrency: None,
            eager_check: true,
            shutdown_timeout: defaults.shutdown_timeout,
            drain_poll_interval: defaults.drain_poll_interval,
            retry_interval: SCHEDULER_RETRY_INTERVAL,
        }
    }

    /// Factory from the `[strategy]` section
    ///
    /// # Errors
    ///
    /// Returns `StrategyError::Config` if any tunable is invalid.
    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        validate_strategy(config)?;
        Ok(Self {
            kind: config.kind,
            buffer_size: config.buffer_size,
            subscriber_count: config.subscriber_count,
            max_concurrency: config.max_concurrency,
            eager_check: config.max_concurrency_eager_check,
            shutdown_timeout: config.shutdown_timeout,
            drain_poll_interval: config.drain_poll_interval,
            retry_interval: SCHEDULER_RETRY_INTERVAL,
        })
    }

    /// Same tunables, different family
    pub fn with_kind(&self, kind: StrategyKind) -> Self {
        Self { kind, ..self.clone() }
    }

    /// Set the ingress buffer size
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotPowerOfTwo` if `size` is not a power of two.
    pub fn set_buffer_size(&mut self, size: usize) -> Result<()> {
        if !size.is_power_of_two() {
            return Err(ConfigError::not_power_of_two("buffer_size", size).into());
        }
        self.buffer_size = size;
        Ok(())
    }

    /// Ingress buffer size
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Set the number of ingress subscribers (emitter handles)
    pub fn set_subscriber_count(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(ConfigError::invalid_value(
                "strategy",
                self.kind.as_str(),
                "subscriber_count",
                "must be greater than 0",
            )
            .into());
        }
        self.subscriber_count = count;
        Ok(())
    }

    /// Number of ingress subscribers
    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    /// Set the maximum number of in-flight events
    pub fn set_max_concurrency(&mut self, max: usize) -> Result<()> {
        if max == 0 {
            return Err(ConfigError::invalid_value(
                "strategy",
                self.kind.as_str(),
                "max_concurrency",
                "must be greater than 0",
            )
            .into());
        }
        self.max_concurrency = Some(max);
        Ok(())
    }

    /// Maximum in-flight events; `None` is unbounded
    #[inline]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Enforce max concurrency at emission (`true`) or only when accepting
    pub fn set_max_concurrency_eager_check(&mut self, eager: bool) {
        self.eager_check = eager;
    }

    /// Whether max concurrency is enforced at emission
    #[inline]
    pub fn max_concurrency_eager_check(&self) -> bool {
        self.eager_check
    }

    /// Set the default drain timeout; zero means do not wait
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
    }

    /// Default drain timeout, used until a pipeline owner supplies its own
    #[inline]
    pub fn shutdown_timeout(&self) -> ShutdownTimeout {
        ShutdownTimeout::from_duration(self.shutdown_timeout)
    }

    /// Family discriminator
    pub fn processing_strategy_type(&self) -> StrategyType {
        StrategyType {
            kind: self.kind,
            profile: Profile::for_kind(self.kind, AdmissionCheck::from_flag(self.eager_check)),
        }
    }

    /// Create the strategy for `pipeline`
    pub fn create(&self, context: &StrategyContext, pipeline: &str) -> Result<Arc<dyn ProcessingStrategy>> {
        let strategy_type = self.processing_strategy_type();
        let settings = Settings {
            buffer_size: self.buffer_size,
            subscriber_count: self.subscriber_count,
            max_concurrency: self.max_concurrency,
            shutdown_timeout: self.shutdown_timeout(),
            drain_poll_interval: self.drain_poll_interval,
            retry_interval: self.retry_interval,
        };

        let strategy = PipelineStrategy::new(
            pipeline,
            self.kind,
            strategy_type.profile(),
            settings,
            context.clone(),
        );

        Ok(match self.kind {
            StrategyKind::TransactionalEmitter => {
                Arc::new(TransactionAwareStrategy::new(Arc::new(strategy)))
            }
            _ => Arc::new(strategy),
        })
    }
}
