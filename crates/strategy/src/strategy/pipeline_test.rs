//! Tests for PipelineStrategy

use super::*;
use crate::event::Outcome;
use crate::stage::{IdentityStage, StageChain};
use crate::strategy::AdmissionCheck;
use crate::test_utils::{
    GateStage, RecordingSchedulerService, ThreadRecordingStage, small_scheduler_config,
    test_context, wait_until,
};

use std::time::Instant;
use tokio_util::sync::CancellationToken;

fn settings(max_concurrency: Option<usize>) -> Settings {
    Settings {
        buffer_size: 64,
        subscriber_count: 2,
        max_concurrency,
        shutdown_timeout: ShutdownTimeout::from_millis(2_000),
        drain_poll_interval: Duration::from_millis(5),
        retry_interval: Duration::from_millis(2),
    }
}

fn strategy_with(kind: StrategyKind, max: Option<usize>, context: StrategyContext) -> PipelineStrategy {
    let profile = Profile::for_kind(kind, AdmissionCheck::Eager);
    PipelineStrategy::new("orders", kind, profile, settings(max), context)
}

fn owner(timeout_ms: i64) -> PipelineOwner {
    PipelineOwner::new("orders", ShutdownTimeout::from_millis(timeout_ms))
}

// ============================================================================
// Synchronous profiles
// ============================================================================

#[test]
fn test_direct_is_synchronous_and_unwrapped() {
    let (context, service, _) = test_context();
    let strategy = strategy_with(StrategyKind::Direct, Some(1), context);
    let stage: Arc<dyn Stage> = Arc::new(IdentityStage);

    assert!(strategy.is_synchronous());
    assert!(strategy.as_lifecycle().is_none());
    assert!(Arc::ptr_eq(&strategy.on_processor(Arc::clone(&stage)), &stage));

    // No admission control, whatever the maximum
    for _ in 0..5 {
        let event = Event::new("x");
        assert_eq!(strategy.check_backpressure_emitting(&event), None);
        strategy.check_backpressure_accepting(&event).unwrap();
    }

    strategy.create_sink(&owner(1_000), stage).unwrap();
    assert_eq!(service.acquired(), 0);
}

#[test]
fn test_direct_sink_runs_on_calling_thread() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Direct, None, context);
    let stage = ThreadRecordingStage::new("record", ProcessingType::Blocking);

    let sink = strategy
        .create_sink(&owner(1_000), strategy.on_processor(stage.clone()))
        .unwrap();
    sink.accept(Event::new("x")).unwrap();

    let here = thread::current().name().unwrap_or("<unnamed>").to_string();
    assert_eq!(stage.threads(), vec![here]);
    assert_eq!(sink.name(), "orders.sink");
}

#[test]
fn test_direct_per_thread_builds_sink_per_thread() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::DirectPerThread, None, context);
    let stage = ThreadRecordingStage::new("record", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(1_000), stage.clone()).unwrap();

    sink.accept(Event::new("a")).unwrap();
    let other = Arc::clone(&sink);
    thread::Builder::new()
        .name("producer-2".into())
        .spawn(move || other.accept(Event::new("b")).unwrap())
        .unwrap()
        .join()
        .unwrap();

    let threads = stage.threads();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[1], "producer-2");
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_blocking_and_intensive_stages_hop_schedulers() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Stream, None, context);

    let blocking = ThreadRecordingStage::new("blocking", ProcessingType::Blocking);
    let io = ThreadRecordingStage::new("io", ProcessingType::IoRw);
    let intensive = ThreadRecordingStage::new("intensive", ProcessingType::CpuIntensive);
    let light = ThreadRecordingStage::new("light", ProcessingType::CpuLite);

    let stages: Vec<Arc<dyn Stage>> = vec![
        strategy.on_processor(blocking.clone()),
        strategy.on_processor(io.clone()),
        strategy.on_processor(intensive.clone()),
        strategy.on_processor(light.clone()),
    ];
    let sink = strategy
        .create_sink(&owner(1_000), Arc::new(StageChain::new(stages)))
        .unwrap();

    sink.accept(Event::new("x")).unwrap();

    assert!(blocking.threads()[0].starts_with("test.orders.pipeline."));
    assert!(io.threads()[0].starts_with("test.orders.pipeline."));
    assert!(intensive.threads()[0].starts_with("test.orders.intensive."));
    let here = thread::current().name().unwrap_or("<unnamed>").to_string();
    assert_eq!(light.threads()[0], here);
}

#[test]
fn test_schedulers_acquired_on_first_sink() {
    let (context, service, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);

    assert!(!strategy.has_schedulers());
    strategy.create_sink(&owner(1_000), Arc::new(IdentityStage)).unwrap();
    assert!(strategy.has_schedulers());
    assert_eq!(service.acquired(), 3);

    // A second sink reuses them
    strategy.create_sink(&owner(1_000), Arc::new(IdentityStage)).unwrap();
    assert_eq!(service.acquired(), 3);
}

#[test]
fn test_acquisition_failure_surfaces_at_create_sink() {
    let service = Arc::new(RecordingSchedulerService::failing(SchedulerKind::Pipeline));
    let context = StrategyContext::new(service.clone(), small_scheduler_config());
    let strategy = strategy_with(StrategyKind::Emitter, None, context);

    // Recorded, not raised
    strategy.initialise().unwrap();

    let err = strategy
        .create_sink(&owner(1_000), Arc::new(IdentityStage))
        .unwrap_err();
    match err {
        StrategyError::Configuration { pipeline, message } => {
            assert_eq!(pipeline, "orders");
            assert!(message.contains("test.orders.pipeline"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }

    // The light scheduler acquired before the failure was released
    assert_eq!(service.stops(), vec![SchedulerKind::Light]);
    assert!(!strategy.has_schedulers());
}

#[test]
fn test_stopped_scheduler_fails_hopped_stage() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Stream, None, context);
    let blocking = strategy.on_processor(ThreadRecordingStage::new("blocking", ProcessingType::Blocking));
    let sink = strategy.create_sink(&owner(1_000), blocking).unwrap();

    strategy
        .schedulers
        .read()
        .as_ref()
        .unwrap()
        .pipeline
        .stop();

    let event = Event::new("x");
    let ctx = Arc::clone(event.context());
    let err = sink.accept(event).unwrap_err();
    assert!(matches!(err, StrategyError::Stage(_)));
    assert!(matches!(ctx.outcome(), Some(Outcome::Failed(_))));
}

#[test]
fn test_stream_emit_does_not_wait_for_blocking_stage() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Stream, None, context);
    let gate = GateStage::new("gate", ProcessingType::Blocking);
    let sink = strategy
        .create_sink(&owner(1_000), strategy.on_processor(gate.clone()))
        .unwrap();

    let event = Event::new("x");
    let ctx = Arc::clone(event.context());
    let start = Instant::now();
    assert_eq!(sink.emit(event).unwrap(), None);
    assert!(start.elapsed() < Duration::from_millis(200));

    wait_until("stage entered", || gate.entered() == 1);
    assert!(!ctx.is_completed());
    assert_eq!(strategy.active_handles(), 1);

    gate.open();
    wait_until("event completed", || ctx.is_completed());
    wait_until("pass finished", || strategy.active_handles() == 0);
}

#[test]
fn test_emitter_emit_reports_full_queue_without_waiting() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(0), gate.clone()).unwrap();

    sink.emit(Event::new("held")).unwrap();
    wait_until("stage entered", || gate.entered() == 1);

    // Two subscribers share a buffer of 64: each queue holds 32
    let start = Instant::now();
    let refused = (0..40)
        .map(|i| sink.emit(Event::new(format!("{i}"))).unwrap())
        .filter(|r| *r == Some(BackPressureReason::RequiredSchedulerBusy))
        .count();
    assert!(start.elapsed() < Duration::from_millis(200));
    assert_eq!(refused, 8);

    strategy.dispose();
    gate.open();
}

#[test]
fn test_emit_on_refusing_light_scheduler_returns_busy() {
    let (context, service, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);
    let sink = strategy.create_sink(&owner(1_000), Arc::new(IdentityStage)).unwrap();

    service.refuse(Some(SchedulerKind::Light));
    let event = Event::new("x");
    let ctx = Arc::clone(event.context());
    let start = Instant::now();
    assert_eq!(
        sink.emit(event).unwrap(),
        Some(BackPressureReason::RequiredSchedulerBusy)
    );
    assert!(start.elapsed() < Duration::from_millis(200));
    // Nothing would drain it, so the queued event was failed
    assert!(matches!(ctx.outcome(), Some(Outcome::Failed(_))));
    assert_eq!(
        strategy.check_backpressure_emitting(&Event::new("y")),
        Some(BackPressureReason::RequiredSchedulerBusy)
    );

    service.refuse(None);
    let event = Event::new("z");
    let ctx = Arc::clone(event.context());
    sink.accept(event).unwrap();
    wait_until("event completed", || ctx.is_completed());
    assert!(!strategy.admission().is_scheduler_busy());
    assert_eq!(strategy.dispose(), DrainOutcome::Drained);
}

// ============================================================================
// Admission
// ============================================================================

#[test]
fn test_emitting_refuses_above_max() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, Some(2), context);

    let events: Vec<Event> = (0..3).map(|i| Event::new(format!("{i}"))).collect();
    assert_eq!(strategy.check_backpressure_emitting(&events[0]), None);
    assert_eq!(strategy.check_backpressure_emitting(&events[1]), None);
    assert_eq!(
        strategy.check_backpressure_emitting(&events[2]),
        Some(BackPressureReason::MaxConcurrencyExceeded)
    );

    events[0].context().complete("done".into());
    assert_eq!(strategy.check_backpressure_emitting(&events[2]), None);
    assert_eq!(strategy.admission().in_flight(), 2);
}

#[test]
fn test_rejected_scheduler_reports_busy_until_scheduled() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, Some(10), context);

    strategy.on_rejected("test.orders.pipeline");
    assert_eq!(
        strategy.check_backpressure_emitting(&Event::new("x")),
        Some(BackPressureReason::RequiredSchedulerBusy)
    );
    assert_eq!(strategy.admission().in_flight(), 0);

    strategy.admission().on_scheduled();
    assert_eq!(strategy.check_backpressure_emitting(&Event::new("x")), None);
}

#[test]
fn test_stop_and_start_toggle_availability() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);
    let sink = strategy.create_sink(&owner(1_000), Arc::new(IdentityStage)).unwrap();

    strategy.stop().unwrap();
    assert!(matches!(
        sink.emit(Event::new("x")),
        Err(StrategyError::NotStarted { .. })
    ));

    strategy.start().unwrap();
    let event = Event::new("x");
    let ctx = Arc::clone(event.context());
    sink.emit(event).unwrap();
    wait_until("event completed", || ctx.is_completed());
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_dispose_drains_and_stops_schedulers_in_order() {
    let (context, service, diagnostics) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);
    let sink = strategy.create_sink(&owner(2_000), Arc::new(IdentityStage)).unwrap();

    let events: Vec<Event> = (0..20).map(|i| Event::new(format!("{i}"))).collect();
    for event in &events {
        sink.accept(event.clone()).unwrap();
    }

    assert_eq!(strategy.dispose(), DrainOutcome::Drained);
    assert!(events.iter().all(|e| e.context().is_completed()));
    assert_eq!(diagnostics.calls(), 0);
    assert_eq!(
        service.stops(),
        vec![SchedulerKind::Light, SchedulerKind::Pipeline, SchedulerKind::Intensive]
    );

    // Idempotent, and closed afterwards
    assert_eq!(strategy.dispose(), DrainOutcome::Drained);
    assert!(sink.accept(Event::new("late")).unwrap_err().is_closed());
    assert!(
        strategy
            .create_sink(&owner(2_000), Arc::new(IdentityStage))
            .unwrap_err()
            .is_closed()
    );
    assert!(strategy.start().is_err());
}

#[test]
fn test_dispose_with_zero_timeout_returns_immediately() {
    let (context, _, diagnostics) = test_context();
    let strategy = strategy_with(StrategyKind::CachedThread, None, context);
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(0), gate.clone()).unwrap();

    sink.emit(Event::new("stuck")).unwrap();
    wait_until("event reached the stage", || gate.entered() == 1);

    let start = std::time::Instant::now();
    let outcome = strategy.dispose();

    assert!(start.elapsed() < Duration::from_millis(200));
    assert_eq!(outcome, DrainOutcome::Skipped { remaining: 1 });
    assert_eq!(diagnostics.outcomes(), vec![outcome]);
    gate.open();
}

#[test]
fn test_dispose_waits_for_emitted_stream_passes() {
    let (context, _, diagnostics) = test_context();
    let strategy = strategy_with(StrategyKind::Stream, None, context);
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(0), gate.clone()).unwrap();

    sink.emit(Event::new("stuck")).unwrap();
    wait_until("event reached the stage", || gate.entered() == 1);

    assert_eq!(strategy.dispose(), DrainOutcome::Skipped { remaining: 1 });
    assert_eq!(diagnostics.calls(), 1);
    gate.open();
}

#[test]
fn test_dispose_releases_accept_waiting_on_full_queue() {
    let (context, _, diagnostics) = test_context();
    let mut settings = settings(None);
    settings.buffer_size = 1;
    let profile = Profile::for_kind(StrategyKind::CachedThread, AdmissionCheck::Eager);
    let strategy = Arc::new(PipelineStrategy::new(
        "orders",
        StrategyKind::CachedThread,
        profile,
        settings,
        context,
    ));
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(100), gate.clone()).unwrap();

    // First event holds the stage, second fills the queue, third waits for room
    let producer = {
        let sink = Arc::clone(&sink);
        thread::spawn(move || {
            (0..3)
                .map(|i| sink.accept(Event::new(format!("{i}"))))
                .collect::<Vec<_>>()
        })
    };
    wait_until("stage entered", || gate.entered() == 1);
    thread::sleep(Duration::from_millis(20));

    let outcome = Arc::new(Mutex::new(None));
    {
        let strategy = Arc::clone(&strategy);
        let outcome = Arc::clone(&outcome);
        thread::spawn(move || *outcome.lock() = Some(strategy.dispose()));
    }
    wait_until("dispose returned", || outcome.lock().is_some());
    assert_eq!(*outcome.lock(), Some(DrainOutcome::TimedOut { remaining: 1 }));
    assert_eq!(diagnostics.calls(), 1);

    let results = producer.join().unwrap();
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(results[2].as_ref().unwrap_err().is_closed());
    gate.open();
}

#[test]
fn test_dispose_interrupted_by_cancellation() {
    let (context, _, diagnostics) = test_context();
    let cancel = CancellationToken::new();
    let strategy = strategy_with(StrategyKind::Emitter, None, context.with_cancellation(cancel.clone()));
    let gate = GateStage::new("gate", ProcessingType::CpuLite);
    let sink = strategy.create_sink(&owner(30_000), gate.clone()).unwrap();

    sink.emit(Event::new("stuck")).unwrap();
    wait_until("event reached the stage", || gate.entered() == 1);

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let start = std::time::Instant::now();
    let outcome = strategy.dispose();
    canceller.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(outcome, DrainOutcome::Interrupted { remaining } if remaining >= 1));
    assert_eq!(diagnostics.calls(), 1);
    // Released regardless of the interrupted wait
    assert!(!strategy.has_schedulers());
    gate.open();
}

#[test]
fn test_dispose_fails_blocked_acceptors() {
    let (context, _, _) = test_context();
    let strategy = Arc::new(strategy_with(StrategyKind::Emitter, Some(1), context));

    let held = Event::new("held");
    strategy.check_backpressure_accepting(&held).unwrap();

    let blocked = {
        let strategy = Arc::clone(&strategy);
        thread::spawn(move || strategy.check_backpressure_accepting(&Event::new("blocked")))
    };
    thread::sleep(Duration::from_millis(30));
    strategy.dispose();

    assert!(blocked.join().unwrap().unwrap_err().is_closed());
}

// ============================================================================
// Internal sinks
// ============================================================================

#[test]
fn test_internal_sink_requires_a_sink() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, None, context);

    let err = strategy
        .register_internal_sink(Box::new(std::iter::empty()), "retries")
        .unwrap_err();
    assert!(matches!(err, StrategyError::InvalidState { .. }));
}

#[test]
fn test_internal_sink_feeds_events_under_admission() {
    let (context, _, diagnostics) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, Some(1), context);
    let stage = ThreadRecordingStage::new("record", ProcessingType::CpuLite);
    strategy.create_sink(&owner(2_000), stage.clone()).unwrap();

    let events: Vec<Event> = (0..10).map(|i| Event::new(format!("{i}"))).collect();
    let stream: EventStream = Box::new(events.clone().into_iter());
    strategy.register_internal_sink(stream, "retries").unwrap();

    wait_until("internal events processed", || stage.calls() == 10);
    assert!(events.iter().all(|e| e.context().outcome().is_some_and(|o| o.is_success())));
    assert!(stage.threads().iter().all(|t| t.starts_with("test.orders.light.")));

    wait_until("internal sink finished", || strategy.active_handles() == 2);
    assert_eq!(strategy.dispose(), DrainOutcome::Drained);
    assert_eq!(diagnostics.calls(), 0);
}

#[test]
fn test_internal_publisher_stops_when_admission_closes() {
    let (context, _, _) = test_context();
    let strategy = strategy_with(StrategyKind::Emitter, Some(1), context);

    let events: Vec<Event> = (0..3).map(|i| Event::new(format!("{i}"))).collect();
    let mut stream = strategy.configure_internal_publisher(Box::new(events.clone().into_iter()));

    assert!(stream.next().is_some());
    strategy.admission().close();
    assert!(stream.next().is_none());
    assert!(matches!(events[1].context().outcome(), Some(Outcome::Failed(_))));
    assert!(stream.next().is_none());
}
