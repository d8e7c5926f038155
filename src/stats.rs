//! Streaming statistics over per-interval latency samples.
//!
//! Samples are microsecond-resolution integers collected into a
//! [`SampleBuffer`] that lives for exactly one aggregation interval. At the
//! interval boundary the buffer is sorted in place and summarized with the
//! order-statistics functions below, then logically cleared for the next
//! interval without giving back its allocation.
//!
//! All statistics are computed with integer arithmetic on microseconds.
//! The mean uses truncating integer division and the standard deviation
//! accumulates squared deviations from that integer mean, which introduces
//! a small systematic bias versus a floating-point formula. This matches
//! the output of prior releases and is kept deliberately.

use serde::{Deserialize, Serialize};

/// Fixed-capacity buffer of latency samples plus an error tally, scoped to
/// one aggregation interval.
///
/// The backing storage is allocated once and reused across intervals;
/// [`SampleBuffer::flush`] resets the logical length and error count but
/// never reallocates.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<u64>,
    capacity: usize,
    errors: u64,
}

/// Aggregated statistics for one interval, in microseconds.
///
/// Produced by [`SampleBuffer::flush`] and handed to the output sink.
/// Conversion to milliseconds for display is the sink's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub samples: usize,
    pub errors: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub std_dev_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl SampleBuffer {
    /// Create a buffer sized for one interval.
    ///
    /// Capacity is the expected tick count for the interval plus one slack
    /// slot, so a tick of scheduling jitter before the boundary fires does
    /// not force a reallocation.
    pub fn new(interval_ms: u64, sample_rate_ms: u64) -> Self {
        let capacity = (interval_ms / sample_rate_ms) as usize + 1;

        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            errors: 0,
        }
    }

    /// Append one successful probe's elapsed time.
    ///
    /// The buffer is bounded: a sample arriving when every slot is taken is
    /// dropped rather than growing the allocation mid-interval.
    pub fn push(&mut self, sample_us: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample_us);
        }
    }

    /// Count one failed probe. Failures never contribute a sample.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Number of recorded samples in the current interval.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Sort the buffer, derive the interval summary, and clear the buffer
    /// for the next interval.
    pub fn flush(&mut self) -> Summary {
        self.samples.sort_unstable();

        let summary = Summary {
            samples: self.samples.len(),
            errors: self.errors,
            min_us: min(&self.samples),
            max_us: max(&self.samples),
            mean_us: mean(&self.samples),
            std_dev_us: std_deviation(&self.samples),
            p95_us: percentile(&self.samples, 95.0),
            p99_us: percentile(&self.samples, 99.0),
        };

        self.samples.clear();
        self.errors = 0;

        summary
    }
}

/// Minimum of a sorted ascending slice; 0 when empty.
pub fn min(sorted: &[u64]) -> u64 {
    sorted.first().copied().unwrap_or(0)
}

/// Maximum of a sorted ascending slice; 0 when empty.
pub fn max(sorted: &[u64]) -> u64 {
    sorted.last().copied().unwrap_or(0)
}

/// Arithmetic mean with truncating integer division; 0 when empty.
pub fn mean(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }

    let sum: u64 = samples.iter().sum();

    sum / samples.len() as u64
}

/// Population standard deviation with integer variance accumulation.
///
/// Deviations are taken from the truncated integer mean and the variance is
/// truncated again before the square root.
pub fn std_deviation(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }

    let m = mean(samples) as i64;
    let mut variance: i64 = 0;

    for &v in samples {
        let d = v as i64 - m;
        variance += d * d;
    }

    ((variance / samples.len() as i64) as f64).sqrt() as u64
}

/// Nearest-rank percentile over a sorted ascending slice.
///
/// With `index = p/100 × n`: an exact integer index selects element
/// `index − 1` (0-based), otherwise element `floor(index)`. Values of `p`
/// above 100 yield 0.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() || p > 100.0 {
        return 0;
    }

    let index = (p / 100.0) * sorted.len() as f64;

    if index == index.trunc() {
        sorted[index as usize - 1]
    } else {
        sorted[index as usize]
    }
}
