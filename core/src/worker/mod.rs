//! Worker module: the per-virtual-user request loop
//!
//! Each worker is a tokio task repeating the same cycle until the run is
//! cancelled:
//!
//! 1. Check the shared cancellation token
//! 2. Wait for a token from the shared rate limiter (if any)
//! 3. Take one unit from the request budget (if any); cancel the run when
//!    it is spent
//! 4. Open the body and send a copy of the request template
//! 5. Fill a pooled record with latency, status, error, byte totals and the
//!    running-worker count, then send it on the record channel
//!
//! Per-request failures end up in the record; they never stop a worker.
//!
//! # Example
//!
//! ```ignore
//! use volley_core::worker::{Worker, WorkerContext};
//!
//! let ctx = Arc::new(WorkerContext { /* built by the requester */ });
//! let stats = Worker::new(0, ctx).run().await;
//! println!("attempts: {}", stats.attempts);
//! ```

mod budget;
mod exchange;
mod executor;
mod rate_limiter;
mod stats;

pub use budget::RequestBudget;
pub use exchange::RequestExecutor;
pub use executor::{Worker, WorkerContext};
pub use rate_limiter::RequestRateLimiter;
pub use stats::WorkerStats;
