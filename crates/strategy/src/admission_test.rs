//! Tests for admission control

use super::*;
use bytes::Bytes;
use std::thread;
use std::time::Instant;

fn admission(max: Option<usize>, eager: bool) -> (Admission, Arc<StrategyMetrics>) {
    let metrics = Arc::new(StrategyMetrics::new());
    (Admission::new("test", max, eager, metrics.clone()), metrics)
}

#[test]
fn test_unbounded_never_refuses() {
    let (admission, _) = admission(None, true);
    let events: Vec<Event> = (0..100).map(|_| Event::new("x")).collect();

    for event in &events {
        assert_eq!(admission.check_emitting(event), None);
    }
    assert_eq!(admission.in_flight(), 100);
}

#[test]
fn test_eager_check_refuses_above_max() {
    let (admission, metrics) = admission(Some(2), true);
    let first = Event::new("1");
    let second = Event::new("2");
    let third = Event::new("3");

    assert_eq!(admission.check_emitting(&first), None);
    assert_eq!(admission.check_emitting(&second), None);
    assert_eq!(
        admission.check_emitting(&third),
        Some(BackPressureReason::MaxConcurrencyExceeded)
    );

    // The refused attempt does not hold a slot
    assert_eq!(admission.in_flight(), 2);
    assert_eq!(metrics.snapshot().rejected_max_concurrency, 1);

    first.context().complete(Bytes::new());
    assert_eq!(admission.in_flight(), 1);
    assert_eq!(admission.check_emitting(&third), None);
}

#[test]
fn test_failure_releases_slot() {
    let (admission, _) = admission(Some(1), true);
    let event = Event::new("x");

    assert_eq!(admission.check_emitting(&event), None);
    event.context().fail("boom");
    assert_eq!(admission.in_flight(), 0);
}

#[test]
fn test_lazy_check_admits_above_max_at_emission() {
    let (admission, _) = admission(Some(1), false);
    let a = Event::new("a");
    let b = Event::new("b");

    assert_eq!(admission.check_emitting(&a), None);
    assert_eq!(admission.check_emitting(&b), None);
    assert_eq!(admission.in_flight(), 2);
}

#[test]
fn test_busy_flag_refuses_without_touching_counter() {
    let (admission, metrics) = admission(Some(10), true);
    admission.on_rejected("test.pipeline");
    assert!(admission.is_scheduler_busy());

    let event = Event::new("x");
    assert_eq!(
        admission.check_emitting(&event),
        Some(BackPressureReason::RequiredSchedulerBusy)
    );
    assert_eq!(admission.in_flight(), 0);
    assert_eq!(metrics.snapshot().rejected_scheduler_busy, 1);
    assert_eq!(metrics.snapshot().scheduler_rejections, 1);

    admission.on_scheduled();
    assert!(!admission.is_scheduler_busy());
    assert_eq!(admission.check_emitting(&event), None);
}

#[test]
fn test_accepting_blocks_until_release() {
    let (admission, _) = admission(Some(1), true);
    let holder = Event::new("holder");
    admission.check_accepting(&holder).unwrap();

    let waiter = {
        let admission = admission.clone();
        thread::spawn(move || {
            let start = Instant::now();
            admission.check_accepting(&Event::new("waiter")).unwrap();
            start.elapsed()
        })
    };

    thread::sleep(Duration::from_millis(50));
    holder.context().complete(Bytes::new());

    let waited = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(40));
    assert_eq!(admission.in_flight(), 1);
}

#[test]
fn test_accepting_waits_out_busy_scheduler() {
    let (admission, _) = admission(None, true);
    admission.on_rejected("test.pipeline");

    let waiter = {
        let admission = admission.clone();
        thread::spawn(move || admission.check_accepting(&Event::new("x")))
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished());
    admission.on_scheduled();

    assert!(waiter.join().unwrap().is_ok());
}

#[test]
fn test_close_fails_blocked_accept() {
    let (admission, _) = admission(Some(1), true);
    admission.check_accepting(&Event::new("holder")).unwrap();

    let waiter = {
        let admission = admission.clone();
        thread::spawn(move || admission.check_accepting(&Event::new("x")))
    };

    thread::sleep(Duration::from_millis(20));
    admission.close();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(err.is_closed());
}

#[test]
fn test_concurrent_accepting_never_exceeds_max() {
    let (admission, _) = admission(Some(3), true);
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let admission = admission.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let event = Event::new("x");
                    admission.check_accepting(&event).unwrap();
                    peak.fetch_max(admission.in_flight(), Ordering::SeqCst);
                    thread::yield_now();
                    event.context().complete(Bytes::new());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(admission.in_flight(), 0);
}
