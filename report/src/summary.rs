//! Record consumer and end-of-run summary

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use volley_core::{RecordReceiver, ReportRecord};

use crate::latency::{LatencyHistogram, LatencySummary};

/// Accumulates records as they arrive
#[derive(Debug, Default)]
pub struct SummaryCollector {
    latencies: LatencyHistogram,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
    requests: u64,
    failures: u64,
    server_errors: u64,
    read_bytes: u64,
    write_bytes: u64,
    max_concurrency: usize,
}

impl SummaryCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the tallies
    pub fn record(&mut self, record: &ReportRecord) {
        self.requests += 1;

        if record.error.is_empty() {
            *self.status_codes.entry(record.code).or_default() += 1;
            self.latencies.record(record.cost);
            if record.is_server_error() {
                self.server_errors += 1;
            }
        } else {
            self.failures += 1;
            *self.errors.entry(record.error.clone()).or_default() += 1;
        }

        // counters are cumulative; the latest record carries the totals
        self.read_bytes = self.read_bytes.max(record.read_bytes);
        self.write_bytes = self.write_bytes.max(record.write_bytes);
        self.max_concurrency = self.max_concurrency.max(record.concurrency);
    }

    /// Records folded in so far
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Close the tallies over a run that took `elapsed`
    pub fn finish(self, elapsed: Duration) -> Summary {
        let secs = elapsed.as_secs_f64();
        let per_second = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };

        Summary {
            elapsed_secs: secs,
            requests: self.requests,
            successes: self.requests - self.failures,
            failures: self.failures,
            server_errors: self.server_errors,
            requests_per_second: per_second(self.requests),
            read_bytes: self.read_bytes,
            write_bytes: self.write_bytes,
            read_bytes_per_second: per_second(self.read_bytes),
            write_bytes_per_second: per_second(self.write_bytes),
            max_concurrency: self.max_concurrency,
            latency: self.latencies.summary(),
            status_codes: self.status_codes,
            errors: self.errors,
        }
    }
}

/// Drain the record channel until it closes
///
/// Every record is handed back to the pool once it has been tallied.
pub async fn collect(mut records: RecordReceiver) -> SummaryCollector {
    let mut collector = SummaryCollector::new();
    while let Some(record) = records.recv().await {
        collector.record(&record);
        records.recycle(record);
    }
    debug!(records = collector.requests(), "record channel drained");
    collector
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Run duration in seconds
    pub elapsed_secs: f64,
    /// Records received
    pub requests: u64,
    /// Records carrying a response
    pub successes: u64,
    /// Records without a response
    pub failures: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    /// Records per second over the run
    pub requests_per_second: f64,
    /// Bytes read from the network
    pub read_bytes: u64,
    /// Bytes written to the network
    pub write_bytes: u64,
    /// Read throughput
    pub read_bytes_per_second: f64,
    /// Write throughput
    pub write_bytes_per_second: f64,
    /// Highest running-worker count seen on a record
    pub max_concurrency: usize,
    /// Latency of calls that got a response
    pub latency: LatencySummary,
    /// Responses by status code
    pub status_codes: BTreeMap<u16, u64>,
    /// Failures by error text
    pub errors: BTreeMap<String, u64>,
}

impl Summary {
    /// Share of records that carried a response
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64
        }
    }
}
