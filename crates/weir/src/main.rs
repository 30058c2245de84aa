//! Weir - drive a processing strategy with synthetic load
//!
//! # Usage
//!
//! ```bash
//! # Defaults: emitter strategy, 10k events
//! weir
//!
//! weir --config configs/weir.toml --events 50000 --stage-delay 1
//! ```
//!
//! Ctrl-C during the run stops producing; a second Ctrl-C interrupts the
//! drain.

mod load;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use weir_config::LogFormat;

/// Weir - processing strategy load driver
#[derive(Parser, Debug)]
#[command(name = "weir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to configs/weir.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of events to dispatch
    #[arg(short, long, default_value_t = 10_000)]
    events: u64,

    /// Milliseconds the blocking stage sleeps per event
    #[arg(long = "stage-delay", default_value_t = 0)]
    stage_delay_ms: u64,

    /// Pipeline name (prefixes scheduler thread names)
    #[arg(short, long, default_value = "load")]
    pipeline: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = run::load_config(cli.config.as_deref())?;

    let directive = config.log.directive(cli.log_level.as_deref());
    init_logging(&directive, config.log.format)?;

    let args = run::RunArgs {
        events: cli.events,
        stage_delay_ms: cli.stage_delay_ms,
        pipeline: cli.pipeline,
    };
    run::run(config, args).await
}

/// Initialize the tracing subscriber for logging
fn init_logging(directive: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_thread_names(true))
            .with(filter)
            .init(),
    }

    Ok(())
}
