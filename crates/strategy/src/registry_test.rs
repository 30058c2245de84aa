//! Tests for StrategyRegistry

use super::*;
use crate::error::StrategyError;
use crate::strategy::Lifecycle;
use crate::test_utils::test_context;

#[test]
fn test_default_registry_has_all_kinds() {
    let registry = default_registry(&StrategyConfig::default()).unwrap();

    assert_eq!(registry.len(), StrategyKind::ALL.len());
    for kind in StrategyKind::ALL {
        assert!(registry.contains(kind.as_str()));
        assert_eq!(
            registry.get(kind.as_str()).unwrap().processing_strategy_type().kind(),
            kind
        );
    }
    assert_eq!(
        registry.available_types(),
        vec![
            "cached_thread",
            "direct",
            "direct_per_thread",
            "emitter",
            "stream",
            "transactional_emitter"
        ]
    );
}

#[test]
fn test_default_registry_rejects_invalid_config() {
    let config = StrategyConfig {
        buffer_size: 3,
        ..Default::default()
    };
    assert!(default_registry(&config).is_err());
}

#[test]
fn test_unknown_type() {
    let (context, _, _) = test_context();
    let registry = default_registry(&StrategyConfig::default()).unwrap();

    let err = registry.create("proactor", &context, "p").err().unwrap();
    assert!(matches!(err, StrategyError::Config(_)));
    assert!(err.to_string().contains("emitter"));
}

#[test]
fn test_try_register_refuses_duplicates() {
    let mut registry = StrategyRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.try_register("direct", StrategyFactory::new(StrategyKind::Direct)));
    assert!(!registry.try_register("direct", StrategyFactory::new(StrategyKind::Emitter)));
    assert_eq!(registry.len(), 1);
}

#[test]
#[should_panic(expected = "already registered")]
fn test_register_panics_on_duplicate() {
    let mut registry = StrategyRegistry::new();
    registry.register("direct", StrategyFactory::new(StrategyKind::Direct));
    registry.register("direct", StrategyFactory::new(StrategyKind::Direct));
}

#[test]
fn test_create_managed_initialises_async_strategies() {
    let (context, service, _) = test_context();
    let registry = default_registry(&StrategyConfig::default()).unwrap();

    let direct = registry.create_managed("direct", &context, "p").unwrap();
    assert!(direct.is_synchronous());
    assert_eq!(service.acquired(), 0);

    let emitter = registry.create_managed("emitter", &context, "p").unwrap();
    assert_eq!(service.acquired(), 3);

    let lifecycle: &dyn Lifecycle = emitter.as_lifecycle().unwrap();
    assert!(lifecycle.dispose().is_clean());
}
