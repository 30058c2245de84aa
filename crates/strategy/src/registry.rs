//! Strategy Registry - strategy creation by type name
//!
//! Maps the names used in config files (`"emitter"`, `"direct"`, ...) to
//! factories, and creates lifecycle-managed strategies ready to use.
//!
//! ```ignore
//! let registry = default_registry(&config.strategy)?;
//! let strategy = registry.create_managed("emitter", &context, "orders")?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use weir_config::{ConfigError, StrategyConfig, StrategyKind};

use crate::error::Result;
use crate::factory::StrategyFactory;
use crate::strategy::{ProcessingStrategy, StrategyContext};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Registry of strategy factories
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register` for fallible registration.
    pub fn register(&mut self, type_name: &str, factory: StrategyFactory) {
        if self.factories.contains_key(type_name) {
            panic!("Strategy factory '{}' already registered", type_name);
        }
        self.factories.insert(type_name.to_string(), factory);
    }

    /// Try to register a factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register(&mut self, type_name: &str, factory: StrategyFactory) -> bool {
        if self.factories.contains_key(type_name) {
            return false;
        }
        self.factories.insert(type_name.to_string(), factory);
        true
    }

    /// Factory registered under `type_name`
    pub fn get(&self, type_name: &str) -> Option<&StrategyFactory> {
        self.factories.get(type_name)
    }

    /// Create a strategy
    ///
    /// # Errors
    /// Returns `StrategyError::Config` if the type is not registered.
    pub fn create(
        &self,
        type_name: &str,
        context: &StrategyContext,
        pipeline: &str,
    ) -> Result<Arc<dyn ProcessingStrategy>> {
        self.factory(type_name)?.create(context, pipeline)
    }

    /// Create a strategy and, if its type is lifecycle-managed, initialise
    /// and start it
    pub fn create_managed(
        &self,
        type_name: &str,
        context: &StrategyContext,
        pipeline: &str,
    ) -> Result<Arc<dyn ProcessingStrategy>> {
        let factory = self.factory(type_name)?;
        let strategy = factory.create(context, pipeline)?;

        if factory.processing_strategy_type().is_lifecycle_managed()
            && let Some(lifecycle) = strategy.as_lifecycle()
        {
            lifecycle.initialise()?;
            lifecycle.start()?;
        }
        Ok(strategy)
    }

    /// Check if a strategy type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn available_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn factory(&self, type_name: &str) -> Result<&StrategyFactory> {
        self.factories.get(type_name).ok_or_else(|| {
            ConfigError::invalid_value(
                "strategy",
                type_name,
                "type",
                format!(
                    "unknown strategy type, available: [{}]",
                    self.available_types().join(", ")
                ),
            )
            .into()
        })
    }
}

/// Registry with every built-in strategy family, all sharing `config`'s tunables
pub fn default_registry(config: &StrategyConfig) -> Result<StrategyRegistry> {
    let base = StrategyFactory::from_config(config)?;
    let mut registry = StrategyRegistry::new();
    for kind in StrategyKind::ALL {
        registry.register(kind.as_str(), base.with_kind(kind));
    }
    Ok(registry)
}
