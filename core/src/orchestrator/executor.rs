//! Requester execution logic

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::capability::ClientCapability;
use crate::channel::RecordSender;
use crate::config::LoadConfig;
use crate::diagnostics::ServerErrorLog;
use crate::lifecycle::{spawn_deadline, spawn_signal_listener, Canceller, Lifecycle, RunState};
use crate::metrics::RecordPool;
use crate::worker::{
    RequestBudget, RequestExecutor, RequestRateLimiter, Worker, WorkerContext, WorkerStats,
};

use super::aggregator::{aggregate_worker_stats, RunStats};
use super::ramp::RampSchedule;

/// Owns one run: client capability, record channel and lifecycle
///
/// Use [`RequesterBuilder`](super::RequesterBuilder) to construct one.
pub struct Requester {
    pub(crate) load: LoadConfig,
    pub(crate) capability: ClientCapability,
    pub(crate) diagnostics: Arc<ServerErrorLog>,
    pub(crate) pool: Arc<RecordPool>,
    pub(crate) records: RecordSender,
    pub(crate) lifecycle: Arc<Lifecycle>,
}

impl Requester {
    /// Handle for cancelling the run from another task
    pub fn canceller(&self) -> Canceller {
        Canceller::new(Arc::clone(&self.lifecycle))
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    /// Get the load configuration
    pub fn load(&self) -> &LoadConfig {
        &self.load
    }

    /// Run until the duration elapses, the budget is spent, a signal
    /// arrives or the run is cancelled
    ///
    /// The record channel is closed and server error diagnostics are
    /// flushed by the time this returns.
    pub async fn run(self) -> RunStats {
        let run_start = Instant::now();
        let lifecycle = Arc::clone(&self.lifecycle);
        let schedule = RampSchedule::new(self.load.concurrency, self.load.ramp_up);
        let ClientCapability {
            client,
            template,
            body,
            request_timeout,
            counters,
        } = self.capability;

        tracing::info!(
            client = client.name(),
            target = %template.target(),
            concurrency = self.load.concurrency,
            requests = self.load.requests,
            duration = ?self.load.duration,
            rate = ?self.load.rate,
            ramp_up = schedule.batch_size(),
            "Starting run"
        );

        let signal_task = self
            .load
            .handle_signals
            .then(|| spawn_signal_listener(Arc::clone(&lifecycle)));
        let deadline_task = self
            .load
            .duration
            .map(|duration| spawn_deadline(Arc::clone(&lifecycle), duration));

        let diagnostics = Arc::clone(&self.diagnostics);
        let running = Arc::new(AtomicUsize::new(0));
        let ctx = Arc::new(WorkerContext {
            template,
            body,
            executor: RequestExecutor::new(client, request_timeout, self.diagnostics),
            limiter: RequestRateLimiter::new(self.load.rate),
            budget: RequestBudget::new(self.load.requests),
            counters,
            pool: self.pool,
            running: Arc::clone(&running),
            records: self.records,
            lifecycle: Arc::clone(&lifecycle),
            run_start,
        });

        let mut workers = JoinSet::new();
        let mut spawned = 0;
        'batches: for batch in 0..schedule.batches() {
            for _ in 0..schedule.batch_size() {
                if !schedule.admits(spawned) {
                    break 'batches;
                }
                running.fetch_add(1, Ordering::Relaxed);
                workers.spawn(Worker::new(spawned, Arc::clone(&ctx)).run());
                spawned += 1;
            }

            let last = batch + 1 == schedule.batches();
            if schedule.is_ramping() && !last {
                tracing::debug!(spawned, "Ramp batch started");
                tokio::select! {
                    _ = lifecycle.token().cancelled() => break 'batches,
                    _ = tokio::time::sleep(self.load.ramp_interval) => {}
                }
            }
        }
        // the workers hold the only remaining senders
        drop(ctx);

        let mut results: Vec<WorkerStats> = Vec::with_capacity(spawned);
        let mut panicked = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => results.push(stats),
                Err(e) => {
                    panicked += 1;
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
        }

        if let Err(e) = diagnostics.flush().await {
            tracing::warn!(error = %e, "Failed to flush server error diagnostics");
        }
        lifecycle.finish();
        for task in [signal_task, deadline_task].into_iter().flatten() {
            task.abort();
        }

        let mut stats = aggregate_worker_stats(&results);
        stats.panicked = panicked;
        stats.elapsed = run_start.elapsed();
        stats.stop_reason = lifecycle.stop_reason();

        tracing::info!(
            workers = spawned,
            attempts = stats.attempts,
            failures = stats.failures,
            dropped = stats.dropped,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            reason = ?stats.stop_reason,
            "Run finished"
        );

        stats
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("load", &self.load)
            .field("client", &self.capability.client.name())
            .field("target", &self.capability.template.target())
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
