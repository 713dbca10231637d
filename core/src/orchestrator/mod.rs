//! Requester: ramp-up scheduling and run lifecycle
//!
//! The Requester coordinates one complete run:
//! - Spawning workers in ramp-up batches
//! - Wiring signals, the duration timer and the request budget to the
//!   shared lifecycle
//! - Closing the record channel exactly once
//! - Collecting worker stats into a [`RunStats`]
//!
//! # Example
//!
//! ```ignore
//! use volley_core::{LoadConfig, RequesterBuilder};
//!
//! let (requester, records) = RequesterBuilder::new()
//!     .load(LoadConfig::new(10).with_duration(Duration::from_secs(30)))
//!     .capability(capability)
//!     .build()?;
//!
//! let consumer = tokio::spawn(summarize(records));
//! let stats = requester.run().await;
//! ```

mod aggregator;
mod builder;
mod executor;
mod ramp;

pub use aggregator::{aggregate_worker_stats, RunStats};
pub use builder::RequesterBuilder;
pub use executor::Requester;
pub use ramp::RampSchedule;

#[cfg(test)]
mod tests;
