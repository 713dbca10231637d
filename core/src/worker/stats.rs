//! Per-worker tallies

use std::ops::AddAssign;
use std::time::Duration;

/// What one worker did over its lifetime
///
/// Bookkeeping for logs and [`RunStats`](crate::RunStats) only; per-request
/// outcomes travel as records through the channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// Attempts that took a budget slot, body-open failures included
    pub attempts: usize,

    /// Attempts that ended without a status code
    pub failures: usize,

    /// Attempts answered with a 5xx status
    pub server_errors: usize,

    /// Records refused because the channel had already been closed
    pub dropped: usize,

    /// Time between the worker starting and leaving its loop
    pub active: Duration,
}

impl WorkerStats {
    /// Empty tallies
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt by the status it ended with, 0 meaning no response
    pub fn record_attempt(&mut self, code: u16) {
        self.attempts += 1;
        match code {
            0 => self.failures += 1,
            500.. => self.server_errors += 1,
            _ => {}
        }
    }

    /// Count a record the channel refused
    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    /// Attempts that obtained a response, 5xx included
    pub fn responses(&self) -> usize {
        self.attempts - self.failures
    }
}

impl AddAssign<&WorkerStats> for WorkerStats {
    fn add_assign(&mut self, other: &WorkerStats) {
        self.attempts += other.attempts;
        self.failures += other.failures;
        self.server_errors += other.server_errors;
        self.dropped += other.dropped;
        self.active = self.active.max(other.active);
    }
}
