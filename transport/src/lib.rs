//! volley-transport: the HTTP client behind volley
//!
//! Implements [`volley_core::HttpClient`] on top of hyper's HTTP/1.1
//! connection API:
//!
//! - Direct, SOCKS5 and HTTP CONNECT dialing, all bounded by the dial timeout
//! - Byte accounting on every connection, proxy-agnostic
//! - Per-read and per-write socket timeouts
//! - rustls with optional client certificates or no verification at all
//! - A connection cap and a keep-alive pool
//!
//! Use [`build_client`] to turn [`volley_core::RunOptions`] into a
//! [`volley_core::ClientCapability`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod client;
pub mod counting;
pub mod dial;
pub mod proxy;
pub mod timeout;
pub mod tls;

pub use builder::build_client;
pub use client::{ClientSettings, HyperClient};
pub use counting::{CountingDialer, CountingStream};
pub use dial::{BoxedIo, Dial, DirectDialer};
pub use proxy::{ProxyKind, ProxySpec};
pub use timeout::TimeoutIo;
pub use tls::TlsSetup;
