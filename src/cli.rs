use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Redis Latency Monitor - Tiny Redis client for latency measurement
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Server host
    #[clap(short = 'H', long, default_value = crate::defaults::HOST)]
    pub host: String,

    /// Server port
    #[clap(short = 'p', long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Server password, sent as AUTH once per connection
    #[clap(short = 'a', long)]
    pub password: Option<String>,

    /// Connection timeout in seconds
    #[clap(short = 't', long, default_value_t = crate::defaults::CONNECT_TIMEOUT_SECS,
           value_parser = clap::value_parser!(u64).range(1..=300))]
    pub timeout: u64,

    /// Aggregation interval in seconds
    #[clap(short = 'i', long, default_value_t = crate::defaults::INTERVAL_SECS,
           value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub interval: u64,

    /// Measure TCP connection latency instead of command latency
    #[clap(short = 'c', long, default_value_t = false)]
    pub connect: bool,

    /// Use Unix timestamps in CSV output
    #[clap(short = 'T', long, default_value_t = false)]
    pub timestamps: bool,

    /// Path to CSV output file (interactive table when omitted)
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Path to error log file
    #[clap(short = 'e', long)]
    pub error_log: Option<PathBuf>,

    /// Disable colored output
    #[clap(long, default_value_t = false)]
    pub no_color: bool,
}

/// Probe strategy selected at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ProbeMode {
    /// Round-trip a PING over a persistent connection
    #[clap(name = "command")]
    CommandLatency,

    /// Open and close a fresh TCP connection
    #[clap(name = "connect")]
    ConnectLatency,
}

impl ProbeMode {
    /// The fixed probe cadence for this mode. Not user-configurable.
    pub fn sample_rate(&self) -> Duration {
        match self {
            ProbeMode::CommandLatency => {
                Duration::from_millis(crate::defaults::LATENCY_SAMPLE_RATE_MS)
            }
            ProbeMode::ConnectLatency => {
                Duration::from_millis(crate::defaults::CONNECT_SAMPLE_RATE_MS)
            }
        }
    }
}

impl std::fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeMode::CommandLatency => write!(f, "command latency"),
            ProbeMode::ConnectLatency => write!(f, "connection latency"),
        }
    }
}

/// Timestamp rendering for CSV records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampStyle {
    HumanReadable,
    UnixEpoch,
}

/// Where aggregated records go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputDestination {
    InteractiveTable,
    CsvFile(PathBuf),
}

/// Immutable configuration for the measurement process, created once at
/// startup and shared for the lifetime of the run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub auth_secret: Option<String>,
    pub connect_timeout: Duration,
    pub interval: Duration,
    pub probe_mode: ProbeMode,
    pub output: OutputDestination,
    pub timestamp_style: TimestampStyle,
    pub error_log: Option<PathBuf>,
}

impl MonitorConfig {
    /// Endpoint in `host:port` form for dialing.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The fixed probe cadence derived from the probe mode.
    pub fn sample_rate(&self) -> Duration {
        self.probe_mode.sample_rate()
    }
}

impl From<&Args> for MonitorConfig {
    fn from(args: &Args) -> Self {
        let probe_mode = if args.connect {
            ProbeMode::ConnectLatency
        } else {
            ProbeMode::CommandLatency
        };

        let output = match &args.output {
            Some(path) => OutputDestination::CsvFile(path.clone()),
            None => OutputDestination::InteractiveTable,
        };

        let timestamp_style = if args.timestamps {
            TimestampStyle::UnixEpoch
        } else {
            TimestampStyle::HumanReadable
        };

        Self {
            host: args.host.clone(),
            port: args.port,
            auth_secret: args.password.clone(),
            connect_timeout: Duration::from_secs(args.timeout),
            interval: Duration::from_secs(args.interval),
            probe_mode,
            output,
            timestamp_style,
            error_log: args.error_log.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("redis-latency-monitor").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from(&parse(&[]));

        assert_eq!(config.addr(), "127.0.0.1:6379");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.probe_mode, ProbeMode::CommandLatency);
        assert_eq!(config.sample_rate(), Duration::from_millis(10));
        assert_eq!(config.output, OutputDestination::InteractiveTable);
        assert_eq!(config.timestamp_style, TimestampStyle::HumanReadable);
    }

    #[test]
    fn test_connect_mode_sample_rate() {
        let config = MonitorConfig::from(&parse(&["--connect"]));

        assert_eq!(config.probe_mode, ProbeMode::ConnectLatency);
        assert_eq!(config.sample_rate(), Duration::from_millis(100));
    }

    #[test]
    fn test_output_and_timestamps() {
        let config = MonitorConfig::from(&parse(&["-o", "out.csv", "-T"]));

        assert_eq!(
            config.output,
            OutputDestination::CsvFile(PathBuf::from("out.csv"))
        );
        assert_eq!(config.timestamp_style, TimestampStyle::UnixEpoch);
    }

    #[test]
    fn test_range_validation() {
        let argv = |rest: &[&str]| {
            Args::try_parse_from(
                std::iter::once("redis-latency-monitor").chain(rest.iter().copied()),
            )
        };

        assert!(argv(&["-i", "0"]).is_err());
        assert!(argv(&["-i", "3601"]).is_err());
        assert!(argv(&["-t", "0"]).is_err());
        assert!(argv(&["-t", "301"]).is_err());
        assert!(argv(&["-i", "3600", "-t", "300"]).is_ok());
    }
}
