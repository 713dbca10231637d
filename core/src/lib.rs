//! volley-core: the load-generation engine behind volley
//!
//! This crate owns everything between "a client that can send one request"
//! and "a stream of per-request records":
//!
//! - Run options, load shape and the request template
//! - The [`HttpClient`] seam implemented by `volley-transport`
//! - Workers, the shared rate limiter and the request budget
//! - Ramp-up scheduling and the run lifecycle
//! - The record pool and the bounded, close-guarded record channel
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod request;
pub mod traits;
pub mod worker;

pub use capability::ClientCapability;
pub use channel::{ChannelConfig, RecordReceiver};
pub use config::{BodySource, ConfigError, LoadConfig, RunOptions};
pub use diagnostics::ServerErrorLog;
pub use error::*;
pub use lifecycle::{Canceller, RunState, StopReason};
pub use metrics::{ByteCounters, ReportRecord};
pub use orchestrator::{RampSchedule, Requester, RequesterBuilder, RunStats};
pub use request::{RequestBody, RequestTemplate, TargetAddr};
pub use traits::{HttpClient, ResponseBody, TransportError};
pub use worker::{RequestRateLimiter, WorkerStats};
