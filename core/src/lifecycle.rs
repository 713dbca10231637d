//! Run lifecycle and cancellation
//!
//! A run moves `Running -> Cancelling -> Closed`. Any number of triggers may
//! race to cancel it (OS signals, the duration timer, the request budget, an
//! external [`Canceller`]); the first one wins and the rest are no-ops. The
//! record channel is closed exactly once, either directly by a trigger or
//! when the run finishes.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::CloseGuard;

const RUNNING: u8 = 0;
const CANCELLING: u8 = 1;
const CLOSED: u8 = 2;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Workers are issuing requests
    Running,
    /// Cancellation was requested; workers are winding down
    Cancelling,
    /// Every worker exited and the record channel is closed
    Closed,
}

/// What ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM
    Signal,
    /// Configured duration elapsed
    Deadline,
    /// Request budget ran out
    BudgetExhausted,
    /// [`Canceller::cancel`] was called
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Signal => "signal",
            StopReason::Deadline => "deadline",
            StopReason::BudgetExhausted => "budget exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Shared lifecycle controller for one run
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    reason: OnceLock<StopReason>,
    token: CancellationToken,
    records: CloseGuard,
}

impl Lifecycle {
    /// Controller in the running state, owning the close of `records`
    pub fn new(records: CloseGuard) -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            reason: OnceLock::new(),
            token: CancellationToken::new(),
            records,
        }
    }

    /// Request cancellation; `true` only for the trigger that won
    pub fn cancel(&self, reason: StopReason) -> bool {
        let won = self
            .state
            .compare_exchange(RUNNING, CANCELLING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            let _ = self.reason.set(reason);
            tracing::info!(reason = %reason, "Cancelling run");
        }
        self.token.cancel();
        won
    }

    /// Close the record channel and cancel in one step
    ///
    /// Used by the signal and deadline triggers: records produced after this
    /// point are dropped instead of delivered.
    pub fn shutdown(&self, reason: StopReason) -> bool {
        self.close_records();
        self.cancel(reason)
    }

    /// Close the record channel; `true` only for the call that closed it
    pub fn close_records(&self) -> bool {
        let closed = self.records.close();
        if closed {
            tracing::debug!("Record channel closed");
        }
        closed
    }

    /// Enter the terminal state once every worker has exited
    pub fn finish(&self) {
        self.close_records();
        self.token.cancel();
        self.state.store(CLOSED, Ordering::Release);
    }

    /// Current state
    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => RunState::Running,
            CANCELLING => RunState::Cancelling,
            _ => RunState::Closed,
        }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token every worker waits on
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The trigger that won, if any fired
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }
}

/// Cloneable handle for cancelling a run from outside
#[derive(Debug, Clone)]
pub struct Canceller {
    lifecycle: Arc<Lifecycle>,
}

impl Canceller {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Stop the run; in-flight workers still deliver their records
    pub fn cancel(&self) {
        self.lifecycle.cancel(StopReason::Cancelled);
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }
}

// ============================================================================
// Triggers
// ============================================================================

/// Shut the run down on SIGINT (and SIGTERM on unix)
pub fn spawn_signal_listener(lifecycle: Arc<Lifecycle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = lifecycle.token().cancelled() => {}
            res = shutdown_signal() => match res {
                Ok(()) => {
                    tracing::info!("Received interrupt, shutting down");
                    lifecycle.shutdown(StopReason::Signal);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for shutdown signals");
                }
            },
        }
    })
}

/// Shut the run down once `duration` has elapsed
pub fn spawn_deadline(lifecycle: Arc<Lifecycle>, duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = lifecycle.token().cancelled() => {}
            _ = tokio::time::sleep(duration) => {
                tracing::info!(duration = ?duration, "Duration reached, shutting down");
                lifecycle.shutdown(StopReason::Deadline);
            }
        }
    })
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
