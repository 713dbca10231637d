//! End-of-run reporting for volley
//!
//! Drains the record channel into a [`Summary`] (counts, status-code and
//! error tallies, latency distribution, throughput) and renders it as plain
//! text or JSON.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod latency;
pub mod render;
pub mod summary;

pub use latency::{LatencyHistogram, LatencySummary};
pub use render::{render_json, render_text};
pub use summary::{collect, Summary, SummaryCollector};
