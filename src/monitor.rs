//! The sampling loop: alignment, fixed-rate probing, interval flushing.
//!
//! One logical timeline drives measurement. After aligning the first
//! boundary to the wall clock, a fixed-rate ticker fires one probe per
//! tick; each tick's probe, sample append, and boundary check run to
//! completion before the next tick. The ticker is best-effort: a slow probe
//! delays subsequent ticks rather than triggering catch-up bursts.
//!
//! At a boundary crossing the buffered samples are summarized and handed to
//! the sink. The sample whose tick triggered the crossing is excluded from
//! the flushed aggregate and becomes the first sample of the next interval;
//! a failing tick's error stays in the flushed tally. Cancellation abandons
//! the current wait, closes the connection, and flushes buffered output
//! without emitting a partial aggregate.

use crate::cli::MonitorConfig;
use crate::output::{build_sink, IntervalRecord, RecordSink};
use crate::probe::{build_prober, Prober};
use crate::stats::{SampleBuffer, Summary};
use anyhow::{Context, Result};
use chrono::Local;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Granularity the first boundary is aligned to: whole minutes for
/// intervals of a minute or more, otherwise the interval itself. Exact
/// alignment keeps CSV timestamps comparable across runs.
fn alignment_granularity(interval: Duration) -> Duration {
    if interval >= Duration::from_secs(60) {
        Duration::from_secs(60)
    } else {
        interval
    }
}

/// Time remaining until the next boundary that is a whole multiple of
/// `granularity`, computed directly instead of polling.
fn time_to_boundary(since_epoch: Duration, granularity: Duration) -> Duration {
    let granularity_ms = granularity.as_millis() as u64;
    let rem = since_epoch.as_millis() as u64 % granularity_ms;

    if rem == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(granularity_ms - rem)
    }
}

/// Tracks the current interval's buffer and decides, per tick, whether the
/// boundary was crossed and what to flush.
struct IntervalTracker {
    buffer: SampleBuffer,
    interval: Duration,
    last_flush: Instant,
}

impl IntervalTracker {
    fn new(interval: Duration, sample_rate: Duration, start: Instant) -> Self {
        Self {
            buffer: SampleBuffer::new(interval.as_millis() as u64, sample_rate.as_millis() as u64),
            interval,
            last_flush: start,
        }
    }

    fn crossed(&self, tick_start: Instant) -> bool {
        tick_start.duration_since(self.last_flush) >= self.interval
    }

    /// Record a successful probe. When its tick crosses the boundary the
    /// buffer is flushed first and the triggering sample is deferred into
    /// the fresh interval.
    fn on_success(&mut self, sample_us: u64, tick_start: Instant) -> Option<Summary> {
        if self.crossed(tick_start) {
            let summary = self.buffer.flush();
            self.last_flush = tick_start;
            self.buffer.push(sample_us);
            Some(summary)
        } else {
            self.buffer.push(sample_us);
            None
        }
    }

    /// Record a failed probe. The error is tallied into the current
    /// interval before the boundary check, so a triggering tick's failure
    /// is included in the flushed aggregate.
    fn on_failure(&mut self, tick_start: Instant) -> Option<Summary> {
        self.buffer.record_error();

        if self.crossed(tick_start) {
            let summary = self.buffer.flush();
            self.last_flush = tick_start;
            Some(summary)
        } else {
            None
        }
    }
}

/// Owns the prober, the interval state, and the sink for one run.
pub struct LatencyMonitor {
    config: MonitorConfig,
    prober: Box<dyn Prober>,
    sink: Box<dyn RecordSink>,
}

impl LatencyMonitor {
    /// Build a monitor with the prober and sink selected by the
    /// configuration.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let prober = build_prober(&config);
        let sink = build_sink(&config)?;

        Ok(Self::with_parts(config, prober, sink))
    }

    /// Build a monitor from explicit parts. Used by tests to inject probe
    /// and sink doubles.
    pub fn with_parts(
        config: MonitorConfig,
        prober: Box<dyn Prober>,
        sink: Box<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            prober,
            sink,
        }
    }

    /// Run the sampling loop until `shutdown` resolves.
    ///
    /// Initial connection failure (command mode) is fatal and surfaces
    /// before any sampling starts. Probe failures during the loop only
    /// increment the interval's error tally.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        self.prober.prepare().await.with_context(|| {
            format!(
                "Can't connect to {} on {}",
                self.config.host, self.config.port
            )
        })?;

        let granularity = alignment_granularity(self.config.interval);
        let wait = time_to_boundary(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
            granularity,
        );

        debug!("Aligning to next {:?} boundary in {:?}", granularity, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                self.sink.flush()?;
                return Ok(());
            }
        }

        let sample_rate = self.config.sample_rate();
        info!(
            "Measuring {} every {:?}, aggregating over {:?}",
            self.config.probe_mode, sample_rate, self.config.interval
        );

        let mut ticker = tokio::time::interval(sample_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = IntervalTracker::new(self.config.interval, sample_rate, Instant::now());

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let tick_start = Instant::now();

                    let flushed = match self.prober.probe().await {
                        Ok(sample_us) => tracker.on_success(sample_us, tick_start),
                        Err(_) => tracker.on_failure(tick_start),
                    };

                    if let Some(summary) = flushed {
                        let record = IntervalRecord {
                            timestamp: Local::now(),
                            summary,
                        };
                        self.sink.emit(&record)?;
                    }
                }
            }
        }

        debug!("Shutting down, flushing output");
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_granularity() {
        assert_eq!(
            alignment_granularity(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            alignment_granularity(Duration::from_secs(59)),
            Duration::from_secs(59)
        );
        assert_eq!(
            alignment_granularity(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
        assert_eq!(
            alignment_granularity(Duration::from_secs(3600)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_time_to_boundary() {
        let g = Duration::from_secs(60);

        assert_eq!(
            time_to_boundary(Duration::from_secs(120), g),
            Duration::ZERO
        );
        assert_eq!(
            time_to_boundary(Duration::from_secs(61), g),
            Duration::from_secs(59)
        );
        assert_eq!(
            time_to_boundary(Duration::from_millis(119_500), g),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_triggering_sample_deferred_to_next_interval() {
        // 10ms cadence, 1s interval: ticks 1..=100 fill the interval, tick
        // 101 crosses the boundary.
        let start = Instant::now();
        let rate = Duration::from_millis(10);
        let mut tracker = IntervalTracker::new(Duration::from_secs(1), rate, start);

        for i in 0..100u32 {
            let flushed = tracker.on_success(500, start + rate * i);
            assert!(flushed.is_none(), "tick {} should not flush", i + 1);
        }

        let flushed = tracker.on_success(777, start + rate * 100);
        let summary = flushed.expect("tick 101 should flush");
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.errors, 0);

        // The triggering sample opened the next interval.
        assert_eq!(tracker.buffer.len(), 1);

        let next = tracker.on_success(500, start + rate * 200);
        assert!(next.is_none());
        assert_eq!(tracker.buffer.len(), 2);
    }

    #[test]
    fn test_triggering_error_included_in_flush() {
        let start = Instant::now();
        let rate = Duration::from_millis(10);
        let mut tracker = IntervalTracker::new(Duration::from_secs(1), rate, start);

        for i in 0..100u32 {
            tracker.on_success(500, start + rate * i);
        }

        let summary = tracker
            .on_failure(start + rate * 100)
            .expect("boundary tick should flush");
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.errors, 1);
        assert_eq!(tracker.buffer.len(), 0);
        assert_eq!(tracker.buffer.errors(), 0);
    }

    #[test]
    fn test_failures_do_not_consume_sample_slots() {
        let start = Instant::now();
        let rate = Duration::from_millis(10);
        let mut tracker = IntervalTracker::new(Duration::from_secs(1), rate, start);

        tracker.on_success(100, start);
        tracker.on_failure(start + rate);
        tracker.on_failure(start + rate * 2);
        tracker.on_success(300, start + rate * 3);

        let summary = tracker
            .on_success(999, start + Duration::from_secs(1))
            .expect("boundary tick should flush");
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.min_us, 100);
        assert_eq!(summary.max_us, 300);
        assert_eq!(summary.mean_us, 200);
    }

    #[test]
    fn test_empty_interval_flushes_zero_summary() {
        let start = Instant::now();
        let rate = Duration::from_millis(10);
        let mut tracker = IntervalTracker::new(Duration::from_secs(1), rate, start);

        let summary = tracker
            .on_failure(start + Duration::from_secs(1))
            .expect("boundary tick should flush");
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.min_us, 0);
        assert_eq!(summary.p99_us, 0);
    }
}
