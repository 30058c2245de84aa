//! Synthetic load: a small stage chain and the dispatch loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use weir_strategy::{Event, FnStage, Flow, ProcessingType, Stage, StageError};

/// Pause before re-dispatching a refused event
const REFUSAL_BACKOFF: Duration = Duration::from_micros(200);

/// What the dispatch loop saw
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    /// Backpressure refusals, each retried
    pub refusals: u64,
    pub elapsed: Duration,
}

/// `normalize` (light) → `enrich` (blocking) → `checksum` (CPU intensive)
pub fn stages(stage_delay_ms: u64) -> Vec<Arc<dyn Stage>> {
    let delay = Duration::from_millis(stage_delay_ms);

    let normalize = FnStage::new("normalize", ProcessingType::CpuLite, |event: Event| {
        let trimmed = event.payload().trim_ascii().to_ascii_lowercase();
        Ok(event.with_payload(trimmed))
    });

    let enrich = FnStage::new("enrich", ProcessingType::Blocking, move |event: Event| {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut out = b"event=".to_vec();
        out.extend_from_slice(event.payload());
        Ok(event.with_payload(out))
    });

    let checksum = FnStage::new("checksum", ProcessingType::CpuIntensive, |event: Event| {
        if event.payload().is_empty() {
            return Err(StageError::new("checksum", "empty payload"));
        }
        let sum = event
            .payload()
            .iter()
            .fold(0u32, |acc, b| acc.rotate_left(5) ^ u32::from(*b));
        let mut out = event.payload().to_vec();
        out.extend_from_slice(format!(";sum={:08x}", sum).as_bytes());
        Ok(event.with_payload(out))
    });

    vec![Arc::new(normalize), Arc::new(enrich), Arc::new(checksum)]
}

/// Dispatch `events` events, retrying refusals, then wait for all of them
///
/// Cancelling `stop` ends both producing and waiting; disposal drains the rest.
pub fn drive(flow: &Flow, events: u64, stop: &CancellationToken) -> Result<LoadReport> {
    let start = Instant::now();
    let completed = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let mut report = LoadReport::default();

    'produce: for i in 0..events {
        let payload = format!("  Event-{i}  ");
        loop {
            if stop.is_cancelled() {
                break 'produce;
            }

            // Fresh event per attempt: a sink refusal fails the attempt
            let event = Event::new(payload.clone());
            match flow.dispatch(&event)? {
                None => {
                    report.dispatched += 1;
                    let (done, bad) = (Arc::clone(&completed), Arc::clone(&failed));
                    event.context().on_complete(move |outcome| {
                        if outcome.is_success() {
                            done.fetch_add(1, Ordering::Relaxed);
                        } else {
                            bad.fetch_add(1, Ordering::Relaxed);
                        }
                    });
                    break;
                }
                Some(reason) => {
                    report.refusals += 1;
                    tracing::trace!(event = i, %reason, "dispatch refused, retrying");
                    thread::sleep(REFUSAL_BACKOFF);
                }
            }
        }
    }

    while completed.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed) < report.dispatched
        && !stop.is_cancelled()
    {
        thread::sleep(Duration::from_millis(5));
    }

    report.completed = completed.load(Ordering::Relaxed);
    report.failed = failed.load(Ordering::Relaxed);
    report.elapsed = start.elapsed();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_config::StrategyKind;
    use weir_strategy::test_utils::test_context;
    use weir_strategy::{PipelineOwner, ShutdownTimeout, StrategyFactory};

    fn flow(kind: StrategyKind, max: Option<usize>) -> Flow {
        let (context, _, _) = test_context();
        let mut factory = StrategyFactory::new(kind);
        if let Some(max) = max {
            factory.set_max_concurrency(max).unwrap();
        }
        let strategy = factory.create(&context, "load").unwrap();
        let owner = PipelineOwner::new("load", ShutdownTimeout::from_millis(2_000));
        Flow::build(owner, strategy, stages(0)).unwrap()
    }

    #[test]
    fn test_stages_transform_payload() {
        let flow = flow(StrategyKind::Direct, None);
        let event = Event::new("  Hello  ");
        flow.process(event.clone()).unwrap();

        let outcome = event.context().outcome().unwrap();
        let weir_strategy::Outcome::Completed(payload) = &outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert!(payload.starts_with(b"event=hello;sum="));
    }

    #[test]
    fn test_drive_direct() {
        let flow = flow(StrategyKind::Direct, None);
        let report = drive(&flow, 100, &CancellationToken::new()).unwrap();

        assert_eq!(report.dispatched, 100);
        assert_eq!(report.completed, 100);
        assert_eq!(report.failed, 0);
        assert_eq!(report.refusals, 0);
    }

    #[test]
    fn test_drive_emitter_retries_refusals() {
        let flow = flow(StrategyKind::Emitter, Some(2));
        let report = drive(&flow, 200, &CancellationToken::new()).unwrap();

        assert_eq!(report.dispatched, 200);
        assert_eq!(report.completed, 200);
        assert!(flow.dispose().is_clean());
    }

    #[test]
    fn test_drive_stops_when_cancelled() {
        let flow = flow(StrategyKind::Direct, None);
        let stop = CancellationToken::new();
        stop.cancel();

        let report = drive(&flow, 1_000, &stop).unwrap();
        assert_eq!(report.dispatched, 0);
    }
}
