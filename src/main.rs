//! # Redis Latency Monitor - Main Entry Point
//!
//! Startup sequence:
//! 1. Parse and validate command-line arguments
//! 2. Initialize logging (colorized stderr, optional error log file)
//! 3. Build the immutable monitor configuration
//! 4. Run the sampling loop until Ctrl-C
//!
//! Fatal startup errors (invalid configuration, initial connection refusal,
//! unopenable output or error-log file) are reported and terminate the
//! process with a non-zero exit code before any sampling starts. Transient
//! probe failures during the run only show up in the per-interval error
//! count and the optional error log.

use anyhow::Result;
use clap::Parser;
use redis_latency_monitor::{cli::Args, logging, monitor::LatencyMonitor, MonitorConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    // The guard keeps the non-blocking error-log writer alive until exit.
    let _guard = logging::init(args.error_log.as_deref())?;

    let config = MonitorConfig::from(&args);

    info!(
        "Redis Latency Monitor {} - {} mode against {}",
        redis_latency_monitor::VERSION,
        config.probe_mode,
        config.addr()
    );

    let monitor = LatencyMonitor::new(config)?;

    monitor
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Interrupted, shutting down");
        })
        .await
}
