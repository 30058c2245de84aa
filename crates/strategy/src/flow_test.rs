//! Tests for Flow

use super::*;
use crate::drain::ShutdownTimeout;
use crate::error::StrategyError;
use crate::event::Outcome;
use crate::factory::StrategyFactory;
use crate::stage::{FnStage, ProcessingType, StageError};
use crate::test_utils::{GateStage, test_context, wait_until};

use bytes::Bytes;
use weir_config::StrategyKind;

fn owner() -> PipelineOwner {
    PipelineOwner::new("flow", ShutdownTimeout::from_millis(2_000))
}

fn upper() -> Arc<dyn Stage> {
    Arc::new(FnStage::new("upper", ProcessingType::CpuLite, |event: Event| {
        let upper = event.payload().to_ascii_uppercase();
        Ok(event.with_payload(upper))
    }))
}

fn suffix() -> Arc<dyn Stage> {
    Arc::new(FnStage::new("suffix", ProcessingType::Blocking, |event: Event| {
        let mut out = event.payload().to_vec();
        out.extend_from_slice(b"!");
        Ok(event.with_payload(out))
    }))
}

fn flow(kind: StrategyKind, max: Option<usize>, stages: Vec<Arc<dyn Stage>>) -> Flow {
    let (context, _, _) = test_context();
    let mut factory = StrategyFactory::new(kind);
    if let Some(max) = max {
        factory.set_max_concurrency(max).unwrap();
    }
    let strategy = factory.create(&context, "flow").unwrap();
    Flow::build(owner(), strategy, stages).unwrap()
}

#[test]
fn test_direct_flow_runs_chain_in_order() {
    let flow = flow(StrategyKind::Direct, None, vec![upper(), suffix()]);

    let event = Event::new("hello");
    let ctx = Arc::clone(event.context());
    assert_eq!(flow.dispatch(&event).unwrap(), None);

    assert_eq!(ctx.outcome(), Some(Outcome::Completed(Bytes::from_static(b"HELLO!"))));
    assert_eq!(flow.metrics().snapshot().completed, 1);
    assert_eq!(flow.dispose(), DrainOutcome::Drained);
}

#[test]
fn test_emitter_flow_completes_asynchronously() {
    let flow = flow(StrategyKind::Emitter, None, vec![upper(), suffix()]);

    let events: Vec<Event> = (0..50).map(|i| Event::new(format!("e{i}"))).collect();
    for event in &events {
        flow.process(event.clone()).unwrap();
    }
    wait_until("all events completed", || {
        events.iter().all(|e| e.context().is_completed())
    });

    assert_eq!(
        events[7].context().outcome(),
        Some(Outcome::Completed(Bytes::from_static(b"E7!")))
    );
    assert!(flow.dispose().is_clean());
    assert_eq!(flow.metrics().snapshot().outstanding(), 0);
}

#[test]
fn test_dispatch_refusal_leaves_event_untouched() {
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let flow = flow(StrategyKind::Emitter, Some(1), vec![gate.clone()]);

    let first = Event::new("first");
    assert_eq!(flow.dispatch(&first).unwrap(), None);

    let second = Event::new("second");
    assert_eq!(
        flow.dispatch(&second).unwrap(),
        Some(BackPressureReason::MaxConcurrencyExceeded)
    );
    assert!(!second.context().is_completed());

    gate.open();
    wait_until("first completed", || first.context().is_completed());
    assert_eq!(flow.dispatch(&second).unwrap(), None);
    wait_until("second completed", || second.context().is_completed());
    flow.dispose();
}

#[test]
fn test_process_propagates_stage_error_synchronously() {
    let failing: Arc<dyn Stage> = Arc::new(FnStage::new("reject", ProcessingType::CpuLite, |_e: Event| {
        Err(StageError::new("reject", "invalid order"))
    }));
    let flow = flow(StrategyKind::Direct, None, vec![failing]);

    let event = Event::new("x");
    let ctx = Arc::clone(event.context());
    match flow.process(event) {
        Err(StrategyError::Stage(err)) => assert_eq!(err.message(), "invalid order"),
        other => panic!("expected stage error, got {:?}", other),
    }
    assert!(matches!(ctx.outcome(), Some(Outcome::Failed(_))));
}

#[test]
fn test_transactional_event_refused_by_plain_emitter() {
    let flow = flow(StrategyKind::Emitter, Some(4), vec![upper()]);

    let event = Event::new("x").in_transaction(42);
    let ctx = Arc::clone(event.context());
    let err = flow.dispatch(&event).unwrap_err();

    assert!(matches!(err, StrategyError::Transactional { event_id } if event_id == event.id()));
    assert!(err.to_string().contains("Unable to process a transactional flow asynchronously"));
    // Failing the event gave its slot back
    assert!(matches!(ctx.outcome(), Some(Outcome::Failed(_))));
    assert_eq!(flow.metrics().snapshot().admitted, 1);
    flow.dispose();
}

#[test]
fn test_dispose_then_dispatch_is_closed() {
    let flow = flow(StrategyKind::Stream, None, vec![upper()]);
    flow.dispose();

    let err = flow.process(Event::new("x")).unwrap_err();
    assert!(err.is_closed());
}
