use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// A tracing event formatter for user-facing terminal output.
///
/// Renders each event as a single line colored by severity, with a short
/// level marker for anything above INFO and no span metadata, keeping
/// stderr readable next to the measurement table.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer the fields so color can be applied to the whole line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let line = match *event.metadata().level() {
            Level::ERROR => format!("ERROR: {}", buffer).red().to_string(),
            Level::WARN => format!("WARNING: {}", buffer).yellow().to_string(),
            Level::INFO => buffer.normal().to_string(),
            Level::DEBUG => buffer.blue().to_string(),
            Level::TRACE => buffer.dimmed().to_string(),
        };

        writeln!(writer, "{}", line)
    }
}

/// Initialize the tracing subscriber.
///
/// Events go to stderr through [`ColorizedFormatter`], filtered by
/// `RUST_LOG` (default `info`). When an error log path is configured, ERROR
/// events are additionally appended to that file through a non-blocking
/// writer; the returned guard must stay alive for the lifetime of the
/// process so buffered entries are drained at exit.
pub fn init(error_log: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    match error_log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Can't open error log {:?}", path))?;

            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

            registry.with(file_layer).init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
