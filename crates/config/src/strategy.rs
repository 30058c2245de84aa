//! Processing strategy configuration
//!
//! Selects the strategy family for a pipeline and carries its tunables.
//! Every default lives here as an explicit value; nothing is read from
//! process-wide state.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Default ingress buffer size (events)
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Default number of ingress subscribers / emitter handles
pub const DEFAULT_SUBSCRIBER_COUNT: usize = 2;

/// Strategy family
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Synchronous, calling thread, no admission control
    Direct,
    /// Synchronous, one cached downstream sink per calling thread
    DirectPerThread,
    /// Asynchronous, one-shot dispatch per event on the light scheduler
    Stream,
    /// Asynchronous, per-thread cached ingress handles feeding one consumer
    CachedThread,
    /// Asynchronous, fixed pool of emitter handles (default)
    #[default]
    Emitter,
    /// Emitter pool that runs transactional events synchronously
    TransactionalEmitter,
}

impl StrategyKind {
    /// All strategy kinds, in registry order
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Direct,
        StrategyKind::DirectPerThread,
        StrategyKind::Stream,
        StrategyKind::CachedThread,
        StrategyKind::Emitter,
        StrategyKind::TransactionalEmitter,
    ];

    /// Name used in config files and the strategy registry
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DirectPerThread => "direct_per_thread",
            Self::Stream => "stream",
            Self::CachedThread => "cached_thread",
            Self::Emitter => "emitter",
            Self::TransactionalEmitter => "transactional_emitter",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy configuration
///
/// # Example
///
/// ```toml
/// [strategy]
/// type = "emitter"
/// buffer_size = 256
/// subscriber_count = 2
/// max_concurrency = 64
/// max_concurrency_eager_check = true
/// shutdown_timeout = "5s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Strategy family
    /// Default: emitter
    #[serde(rename = "type")]
    pub kind: StrategyKind,

    /// Ingress buffer size, must be a power of two
    /// Default: 256
    pub buffer_size: usize,

    /// Number of ingress subscribers (emitter handles)
    /// Default: 2
    pub subscriber_count: usize,

    /// Maximum in-flight events; unset means unbounded
    /// Default: None
    pub max_concurrency: Option<usize>,

    /// Reject above max concurrency at emission time instead of queueing
    /// Default: true
    pub max_concurrency_eager_check: bool,

    /// How long disposal waits for ingress handles to drain; zero returns immediately
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Poll interval while draining
    /// Default: 20ms
    #[serde(with = "humantime_serde")]
    pub drain_poll_interval: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            subscriber_count: DEFAULT_SUBSCRIBER_COUNT,
            max_concurrency: None,
            max_concurrency_eager_check: true,
            shutdown_timeout: Duration::from_secs(5),
            drain_poll_interval: Duration::from_millis(20),
        }
    }
}
