//! Presentation sinks for aggregated interval records.
//!
//! The sampling loop hands one [`IntervalRecord`] per interval boundary to
//! a [`RecordSink`]. Two sinks exist: an interactive terminal table and a
//! semicolon-delimited CSV file. The CSV writer is buffered and drained by
//! a background flusher task every 250 ms so a crash loses at most a few
//! lines, with a final synchronous flush at shutdown.

use crate::cli::{MonitorConfig, OutputDestination, TimestampStyle};
use crate::stats::Summary;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::Colorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Rows between visual separators in the interactive table.
const TABLE_SEPARATOR_EVERY: usize = 10;

/// One interval's aggregate, stamped with the wall-clock time of the
/// interval end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub timestamp: DateTime<Local>,
    pub summary: Summary,
}

/// Receives one record per interval boundary.
pub trait RecordSink: Send {
    fn emit(&mut self, record: &IntervalRecord) -> Result<()>;

    /// Drain any buffered output. Called once at shutdown.
    fn flush(&mut self) -> Result<()>;
}

/// Build the sink selected by the configuration. Opening the CSV file is a
/// fatal startup step.
pub fn build_sink(config: &MonitorConfig) -> Result<Box<dyn RecordSink>> {
    match &config.output {
        OutputDestination::InteractiveTable => Ok(Box::new(TableSink::new())),
        OutputDestination::CsvFile(path) => {
            let sink = CsvSink::open(path, config.timestamp_style)
                .with_context(|| format!("Can't open output file {:?}", path))?;
            Ok(Box::new(sink))
        }
    }
}

/// Format a microsecond statistic as milliseconds with 3 decimal places.
fn format_ms(value_us: u64) -> String {
    format!("{:.3}", value_us as f64 / 1000.0)
}

/// Table cell for a statistic; empty intervals render a dash placeholder
/// instead of a zero.
fn format_cell(value_us: u64, empty: bool) -> String {
    if empty {
        "------".to_string()
    } else {
        format_ms(value_us)
    }
}

/// Interactive terminal table, one row per interval.
pub struct TableSink {
    rows: usize,
    header_printed: bool,
}

impl TableSink {
    pub fn new() -> Self {
        Self {
            rows: 0,
            header_printed: false,
        }
    }

    fn print_header(&self) {
        let header = format!(
            "{:>12} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "TIME", "SAMPLES", "ERRORS", "MIN", "MAX", "MEAN", "STDDEV", "PERC95", "PERC99"
        );
        println!("{}", header.bold());
    }

    fn print_separator(&self) {
        println!("{}", "-".repeat(96).dimmed());
    }
}

impl Default for TableSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for TableSink {
    fn emit(&mut self, record: &IntervalRecord) -> Result<()> {
        if !self.header_printed {
            self.print_header();
            self.header_printed = true;
        }

        let s = &record.summary;
        let empty = s.samples == 0;

        println!(
            "{:>12} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            record.timestamp.format("%H:%M:%S%.3f").to_string(),
            s.samples,
            s.errors,
            format_cell(s.min_us, empty),
            format_cell(s.max_us, empty),
            format_cell(s.mean_us, empty),
            format_cell(s.std_dev_us, empty),
            format_cell(s.p95_us, empty),
            format_cell(s.p99_us, empty),
        );

        self.rows += 1;
        if self.rows % TABLE_SEPARATOR_EVERY == 0 {
            self.print_separator();
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// CSV file sink with a background flusher.
///
/// Lines are buffered in a writer shared with a fire-and-forget task that
/// flushes on a fixed period. The task never touches sampling state.
pub struct CsvSink {
    writer: Arc<Mutex<BufWriter<File>>>,
    timestamp_style: TimestampStyle,
    flusher: JoinHandle<()>,
}

impl CsvSink {
    pub fn open(path: &Path, timestamp_style: TimestampStyle) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));

        let shared = Arc::clone(&writer);
        let flusher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(
                crate::defaults::OUTPUT_FLUSH_INTERVAL_MS,
            ));
            loop {
                ticker.tick().await;
                let _ = shared.lock().flush();
            }
        });

        Ok(Self {
            writer,
            timestamp_style,
            flusher,
        })
    }

    fn format_timestamp(&self, timestamp: &DateTime<Local>) -> String {
        match self.timestamp_style {
            TimestampStyle::UnixEpoch => timestamp.timestamp().to_string(),
            TimestampStyle::HumanReadable => timestamp.format("%Y/%m/%d %H:%M:%S%.3f").to_string(),
        }
    }
}

impl RecordSink for CsvSink {
    fn emit(&mut self, record: &IntervalRecord) -> Result<()> {
        let s = &record.summary;
        let line = format!(
            "{};{};{};{};{};{};{};{};{};\n",
            self.format_timestamp(&record.timestamp),
            s.samples,
            s.errors,
            format_ms(s.min_us),
            format_ms(s.max_us),
            format_ms(s.mean_us),
            format_ms(s.std_dev_us),
            format_ms(s.p95_us),
            format_ms(s.p99_us),
        );

        self.writer.lock().write_all(line.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.flusher.abort();
        let _ = self.writer.lock().flush();
    }
}
