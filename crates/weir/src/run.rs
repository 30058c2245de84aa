//! Run command: build the configured strategy, drive it, dispose it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weir_config::Config;
use weir_scheduler::{PooledSchedulerService, SchedulerConfig};
use weir_strategy::{Flow, PipelineOwner, ShutdownTimeout, StrategyContext, default_registry};

use crate::load::{self, LoadReport};

/// Arguments for one run
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub events: u64,
    pub stage_delay_ms: u64,
    pub pipeline: String,
}

/// Load the config file, falling back to defaults when none was given
///
/// An explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    let default_paths = [PathBuf::from("configs/weir.toml"), PathBuf::from("weir.toml")];
    for path in &default_paths {
        if path.exists() {
            return Config::from_file(path).context("failed to load configuration");
        }
    }
    Ok(Config::default())
}

/// Drive the configured strategy and report
pub async fn run(config: Config, args: RunArgs) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        strategy = %config.strategy.kind,
        pipeline = %args.pipeline,
        events = args.events,
        "weir starting"
    );

    let cancel = CancellationToken::new();
    let service = Arc::new(PooledSchedulerService::new());
    let context = StrategyContext::new(
        service.clone(),
        SchedulerConfig::from_config(&config.schedulers),
    )
    .with_cancellation(cancel.clone());

    let registry = default_registry(&config.strategy).context("invalid strategy configuration")?;
    let strategy = registry
        .create_managed(config.strategy.kind.as_str(), &context, &args.pipeline)
        .context("failed to create strategy")?;

    let owner = PipelineOwner::new(
        args.pipeline.as_str(),
        ShutdownTimeout::from_duration(config.strategy.shutdown_timeout),
    );
    let flow = Arc::new(
        Flow::build(owner, strategy, load::stages(args.stage_delay_ms))
            .context("failed to build pipeline")?,
    );

    // Produce on a blocking thread; Ctrl-C stops producing
    let stop_producing = CancellationToken::new();
    let mut producer = tokio::task::spawn_blocking({
        let flow = Arc::clone(&flow);
        let stop = stop_producing.clone();
        let events = args.events;
        move || load::drive(&flow, events, &stop)
    });

    let report = tokio::select! {
        joined = &mut producer => joined.context("load task panicked")??,
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping load...");
            stop_producing.cancel();
            producer.await.context("load task panicked")??
        }
    };
    log_report(&report);

    // A second signal interrupts the drain
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown().await;
            warn!("interrupting drain");
            cancel.cancel();
        }
    });

    let outcome = tokio::task::spawn_blocking({
        let flow = Arc::clone(&flow);
        move || flow.dispose()
    })
    .await
    .context("dispose task panicked")?;
    interrupt.abort();
    service.shutdown();

    let snapshot = flow.metrics().snapshot();
    info!(
        %outcome,
        admitted = snapshot.admitted,
        completed = snapshot.completed,
        failed = snapshot.failed,
        rejected_max_concurrency = snapshot.rejected_max_concurrency,
        rejected_scheduler_busy = snapshot.rejected_scheduler_busy,
        scheduler_rejections = snapshot.scheduler_rejections,
        "weir finished"
    );
    Ok(())
}

fn log_report(report: &LoadReport) {
    let rate = if report.elapsed.as_secs_f64() > 0.0 {
        report.completed as f64 / report.elapsed.as_secs_f64()
    } else {
        0.0
    };
    info!(
        dispatched = report.dispatched,
        completed = report.completed,
        failed = report.failed,
        refusals = report.refusals,
        elapsed_ms = report.elapsed.as_millis() as u64,
        events_per_sec = rate as u64,
        "load finished"
    );
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
