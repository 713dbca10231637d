//! Worker execution loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::channel::{RecordSender, SendOutcome};
use crate::config::BodySource;
use crate::lifecycle::{Lifecycle, StopReason};
use crate::metrics::{ByteCounters, RecordPool};
use crate::request::RequestTemplate;

use super::budget::RequestBudget;
use super::exchange::RequestExecutor;
use super::rate_limiter::RequestRateLimiter;
use super::stats::WorkerStats;

/// State every worker of a run shares
///
/// Built once per run by the requester. Workers only ever read from it or
/// go through atomics; nothing in here is owned by a single worker.
#[derive(Debug)]
pub struct WorkerContext {
    /// Request template copied for every attempt
    pub template: RequestTemplate,

    /// Body source, opened afresh for every attempt
    pub body: BodySource,

    /// Sends requests and fills records
    pub executor: RequestExecutor,

    /// Shared token bucket
    pub limiter: RequestRateLimiter,

    /// Run-wide request budget
    pub budget: RequestBudget,

    /// Transport byte totals
    pub counters: ByteCounters,

    /// Record pool
    pub pool: Arc<RecordPool>,

    /// Workers currently running
    pub running: Arc<AtomicUsize>,

    /// Sending side of the record channel
    pub records: RecordSender,

    /// Run lifecycle
    pub lifecycle: Arc<Lifecycle>,

    /// Baseline all latencies are measured against
    pub run_start: Instant,
}

/// Worker loops: check cancel -> rate wait -> budget -> execute -> report
///
/// Workers are tokio tasks spawned by the ramp scheduler. They keep going
/// until the run is cancelled; a failed request never stops a worker.
pub struct Worker {
    /// Unique worker identifier
    id: usize,

    /// Run-wide shared state
    ctx: Arc<WorkerContext>,
}

impl Worker {
    /// Create a new worker
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    /// Run the worker loop until the run is cancelled
    pub async fn run(self) -> WorkerStats {
        let ctx = &self.ctx;
        let mut stats = WorkerStats::new();
        let started = Instant::now();

        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            if ctx.lifecycle.is_cancelled() {
                break;
            }

            // a cancelled wait goes back to the cancellation check
            if !ctx.limiter.wait(ctx.lifecycle.token()).await {
                continue;
            }

            if !ctx.budget.try_take() {
                tracing::debug!(worker_id = self.id, "Request budget exhausted");
                ctx.lifecycle.cancel(StopReason::BudgetExhausted);
                break;
            }

            let mut record = ctx.pool.acquire();
            match ctx.body.open().await {
                Ok(body) => {
                    let request = ctx.template.request(body);
                    ctx.executor
                        .execute(request, ctx.run_start, &mut record)
                        .await;
                }
                Err(e) => {
                    record.error = e.to_string();
                }
            }
            record.read_bytes = ctx.counters.read();
            record.write_bytes = ctx.counters.written();
            record.concurrency = ctx.running.load(Ordering::Relaxed);

            stats.record_attempt(record.code);
            if !record.error.is_empty() {
                tracing::trace!(worker_id = self.id, error = %record.error, "Request failed");
            }

            match ctx.records.send(record).await {
                SendOutcome::Delivered => {}
                SendOutcome::Closed => stats.record_dropped(),
                SendOutcome::Disconnected => {
                    stats.record_dropped();
                    tracing::trace!(worker_id = self.id, "Record consumer is gone");
                }
            }
        }

        ctx.running.fetch_sub(1, Ordering::Relaxed);
        stats.active = started.elapsed();
        tracing::debug!(
            worker_id = self.id,
            attempts = stats.attempts,
            failures = stats.failures,
            dropped = stats.dropped,
            active_ms = stats.active.as_millis() as u64,
            "Worker finished"
        );

        stats
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("executor", &self.ctx.executor)
            .field("rate_limiter", &self.ctx.limiter)
            .finish()
    }
}
