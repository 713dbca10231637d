//! Latency distribution in fixed memory
//!
//! Percentiles come from an HdrHistogram at microsecond resolution with three
//! significant digits. Min, max, mean and standard deviation are tracked
//! exactly alongside it, so a run of any length costs the same memory.

use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Longest latency the histogram resolves, one hour in microseconds
///
/// Slower calls are clamped into the top bucket; `max` stays exact.
pub const MAX_TRACKED_MICROS: u64 = 3_600_000_000;

/// Latency statistics, all values in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LatencySummary {
    /// Fastest call
    pub min: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation
    pub stddev: f64,
    /// Median
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Slowest call
    pub max: f64,
}

/// Streaming latency accumulator
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
    count: u64,
    min: Duration,
    max: Duration,
    // Welford running mean and squared-deviation sum, in ms
    mean: f64,
    m2: f64,
}

impl LatencyHistogram {
    /// Empty accumulator
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)
            .expect("constant histogram bounds are valid");
        Self {
            histogram,
            count: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Add one call's latency
    pub fn record(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros);

        self.count += 1;
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);

        let x = as_ms(latency);
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Calls recorded so far
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Summarize everything recorded so far
    pub fn summary(&self) -> LatencySummary {
        if self.is_empty() {
            return LatencySummary::default();
        }
        let min = as_ms(self.min);
        let max = as_ms(self.max);
        // bucket edges can land just outside the exact extremes
        let quantile = |q: f64| (self.histogram.value_at_quantile(q) as f64 / 1e3).clamp(min, max);
        let stddev = if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        };

        LatencySummary {
            min,
            mean: self.mean,
            stddev,
            p50: quantile(0.50),
            p90: quantile(0.90),
            p95: quantile(0.95),
            p99: quantile(0.99),
            max,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}
