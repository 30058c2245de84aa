//! Configuration validation
//!
//! Validates tunables before any strategy is built:
//! - Buffer size is a power of two
//! - Subscriber count and max concurrency are positive
//! - Every pool has at least one thread and a non-empty queue
//! - The light pool is left unbounded
//! - The artifact name is usable as a thread-name prefix

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::schedulers::PoolConfig;
use crate::strategy::StrategyConfig;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_strategy(&config.strategy)?;
    validate_schedulers(config)?;
    Ok(())
}

/// Validate the strategy section
pub fn validate_strategy(strategy: &StrategyConfig) -> Result<()> {
    if !strategy.buffer_size.is_power_of_two() {
        return Err(ConfigError::not_power_of_two(
            "buffer_size",
            strategy.buffer_size,
        ));
    }

    if strategy.subscriber_count == 0 {
        return Err(ConfigError::invalid_value(
            "strategy",
            strategy.kind.as_str(),
            "subscriber_count",
            "must be greater than zero",
        ));
    }

    if strategy.max_concurrency == Some(0) {
        return Err(ConfigError::invalid_value(
            "strategy",
            strategy.kind.as_str(),
            "max_concurrency",
            "must be greater than zero when set",
        ));
    }

    if strategy.drain_poll_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "strategy",
            strategy.kind.as_str(),
            "drain_poll_interval",
            "must be greater than zero",
        ));
    }

    Ok(())
}

/// Validate the scheduler section
fn validate_schedulers(config: &Config) -> Result<()> {
    let artifact = config.schedulers.artifact.trim();
    if artifact.is_empty() {
        return Err(ConfigError::invalid_value(
            "scheduler",
            "schedulers",
            "artifact",
            "must not be empty",
        ));
    }

    if config.schedulers.light.queue_size.is_some() {
        return Err(ConfigError::invalid_value(
            "scheduler",
            "light",
            "queue_size",
            "the light pool buffers without bound and takes no queue size",
        ));
    }

    validate_pool("light", &config.schedulers.light)?;
    validate_pool("pipeline", &config.schedulers.pipeline)?;
    validate_pool("intensive", &config.schedulers.intensive)?;
    Ok(())
}

fn validate_pool(name: &'static str, pool: &PoolConfig) -> Result<()> {
    if pool.threads == 0 {
        return Err(ConfigError::invalid_value(
            "scheduler",
            name,
            "threads",
            "must be greater than zero",
        ));
    }

    if pool.queue_size == Some(0) {
        return Err(ConfigError::invalid_value(
            "scheduler",
            name,
            "queue_size",
            "must be greater than zero when set",
        ));
    }

    Ok(())
}
