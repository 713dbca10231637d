//! Result aggregation from multiple workers

use std::time::Duration;

use crate::lifecycle::StopReason;
use crate::worker::WorkerStats;

/// Summary of a finished run, merged from every worker's stats
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Workers that ran to completion
    pub workers: usize,

    /// Workers whose task panicked
    pub panicked: usize,

    /// Total attempts, failed ones included
    pub attempts: usize,

    /// Attempts without a response
    pub failures: usize,

    /// Attempts answered with a 5xx status
    pub server_errors: usize,

    /// Records dropped because the channel was already closed
    pub dropped: usize,

    /// Wall-clock time from run start to the last worker exiting
    pub elapsed: Duration,

    /// Trigger that ended the run
    pub stop_reason: Option<StopReason>,
}

impl RunStats {
    /// Attempts that obtained a response
    pub fn responses(&self) -> usize {
        self.attempts - self.failures
    }

    /// Attempts per second over the whole run
    pub fn attempts_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> RunStats {
    let total = stats.iter().fold(WorkerStats::new(), |mut total, s| {
        total += s;
        total
    });

    RunStats {
        workers: stats.len(),
        attempts: total.attempts,
        failures: total.failures,
        server_errors: total.server_errors,
        dropped: total.dropped,
        ..Default::default()
    }
}
