//! Per-request records, the record pool and the shared byte counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Records kept around for reuse by default
pub const DEFAULT_POOL_IDLE: usize = 1024;

/// Outcome of one attempted request
///
/// A record is produced for every attempt, successful or not. `code` stays
/// zero when no response was obtained and `error` is empty on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRecord {
    /// Call latency measured against the run-start baseline
    pub cost: Duration,

    /// HTTP status code, zero if the request failed before a response
    pub code: u16,

    /// Failure description, empty on success
    pub error: String,

    /// Total bytes read by all connections when the record was emitted
    pub read_bytes: u64,

    /// Total bytes written by all connections when the record was emitted
    pub write_bytes: u64,

    /// Workers running when the record was emitted
    pub concurrency: usize,
}

impl ReportRecord {
    /// Whether the attempt obtained a full response
    pub fn is_success(&self) -> bool {
        self.error.is_empty() && self.code != 0
    }

    /// Whether the server answered with a 5xx status
    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }

    /// Clear every field, keeping the error string's allocation
    pub fn reset(&mut self) {
        self.cost = Duration::ZERO;
        self.code = 0;
        self.error.clear();
        self.read_bytes = 0;
        self.write_bytes = 0;
        self.concurrency = 0;
    }
}

// ============================================================================
// Record pool
// ============================================================================

/// Pool of reusable [`ReportRecord`]s
///
/// Workers take records out with [`acquire`](Self::acquire) and hand them to
/// the consumer through the channel. Giving a record back with
/// [`release`](Self::release) is optional; a record that is never released
/// is simply dropped by whoever holds it last.
#[derive(Debug)]
pub struct RecordPool {
    free: Mutex<Vec<ReportRecord>>,
    max_idle: usize,
}

impl RecordPool {
    /// Create a pool that keeps at most `max_idle` released records
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a cleared record, reusing a released one when available
    pub fn acquire(&self) -> ReportRecord {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match reused {
            Some(mut record) => {
                record.reset();
                record
            }
            None => ReportRecord::default(),
        }
    }

    /// Return a record for later reuse
    pub fn release(&self, record: ReportRecord) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(record);
        }
    }

    /// Number of records waiting for reuse
    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_IDLE)
    }
}

// ============================================================================
// Byte counters
// ============================================================================

/// Run-wide totals of bytes read from and written to the network
///
/// Cheap to clone; all clones share the same counters. Reads are relaxed
/// snapshots and may trail in-flight writes slightly.
#[derive(Debug, Clone, Default)]
pub struct ByteCounters {
    read: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
}

impl ByteCounters {
    /// Fresh counters starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for `n` bytes read
    pub fn add_read(&self, n: u64) {
        self.read.fetch_add(n, Ordering::Relaxed);
    }

    /// Account for `n` bytes written
    pub fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    /// Bytes read so far
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}
