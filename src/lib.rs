//! # Redis Latency Monitor
//!
//! A tiny Redis/Valkey client for latency measurement. The tool probes a
//! server on a fixed cadence, either round-tripping a `PING` over a
//! persistent connection or timing raw TCP connection establishment, and
//! emits one aggregated statistics record per interval to an interactive
//! table or a CSV file.
//!
//! ## Architecture Overview
//!
//! - `cli`: argument parsing and the immutable [`MonitorConfig`]
//! - `connection`: ownership of the single server connection, AUTH, and
//!   lazy reconnect
//! - `probe`: the [`Prober`] trait and its command/connect strategies
//! - `monitor`: boundary alignment, the fixed-rate sampling loop, and
//!   interval flushing
//! - `stats`: the per-interval sample buffer and integer order statistics
//! - `output`: table and CSV sinks for aggregated records
//! - `logging`: colorized stderr logging and the optional error log file
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use redis_latency_monitor::{LatencyMonitor, MonitorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = <redis_latency_monitor::Args as clap::Parser>::parse();
//!     let config = MonitorConfig::from(&args);
//!
//!     let monitor = LatencyMonitor::new(config)?;
//!     monitor
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod cli;
pub mod connection;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod probe;
pub mod stats;

pub use cli::{Args, MonitorConfig, OutputDestination, ProbeMode, TimestampStyle};
pub use connection::{ConnectionManager, ProbeError};
pub use monitor::LatencyMonitor;
pub use output::{IntervalRecord, RecordSink};
pub use probe::{CommandProbe, ConnectProbe, Prober};
pub use stats::{SampleBuffer, Summary};

/// The current version of the monitor, populated from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values.
pub mod defaults {
    /// Default server host.
    pub const HOST: &str = "127.0.0.1";

    /// Default server port.
    pub const PORT: u16 = 6379;

    /// Default connection timeout in seconds.
    pub const CONNECT_TIMEOUT_SECS: u64 = 3;

    /// Default aggregation interval in seconds.
    pub const INTERVAL_SECS: u64 = 60;

    /// Probe cadence for command-latency mode. A PING round-trip is cheap
    /// enough to sample at 10 ms without loading the server.
    pub const LATENCY_SAMPLE_RATE_MS: u64 = 10;

    /// Probe cadence for connect-latency mode. Connection churn is more
    /// expensive for the server, so connect mode samples at 100 ms.
    pub const CONNECT_SAMPLE_RATE_MS: u64 = 100;

    /// Period of the background CSV flusher task.
    pub const OUTPUT_FLUSH_INTERVAL_MS: u64 = 250;
}
