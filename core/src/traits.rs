//! Core traits for the HTTP client capability
//!
//! The trait is defined in core so the worker pool can be driven by any
//! transport. The real implementation lives in `volley-transport`; tests use
//! in-memory mocks.

use crate::request::RequestBody;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

// ============================================================================
// HTTP Client Trait
// ============================================================================

/// Streaming response body handed back by an [`HttpClient`]
///
/// Chunks are yielded as they arrive off the wire; the executor never
/// collects them into one buffer.
pub type ResponseBody = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Reusable HTTP client capability shared by every worker
///
/// Implementations own connection pooling, dialing (direct or through a
/// proxy), TLS and byte accounting. The per-request deadline is not part of
/// the client: the executor wraps [`send`](Self::send) and the body drain in
/// a timeout of its own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Client identifier for logs (e.g. "hyper")
    fn name(&self) -> &str;

    /// Send a request and return the response head with a streaming body
    async fn send(
        &self,
        request: http::Request<RequestBody>,
    ) -> Result<http::Response<ResponseBody>, TransportError>;
}

/// Per-request failures
///
/// None of these abort a run. The executor renders them into the
/// [`ReportRecord`](crate::metrics::ReportRecord) of the attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// TCP connection could not be established
    #[error("dial error: {0}")]
    Connect(String),

    /// Proxy refused or broke the tunnel handshake
    #[error("proxy error: {0}")]
    Proxy(String),

    /// TLS handshake failed
    #[error("tls error: {0}")]
    Tls(String),

    /// Deadline exceeded
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Socket level failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed exchange at the HTTP layer
    #[error("http error: {0}")]
    Http(String),

    /// Failure while streaming the response body
    #[error("body read error: {0}")]
    Body(String),

    /// Request body file could not be opened
    #[error("open body file {}: {source}", path.display())]
    BodyFile {
        /// File that was configured as the body
        path: PathBuf,
        /// Underlying open failure
        source: std::io::Error,
    },
}

impl TransportError {
    /// Whether the failure was a deadline rather than a broken exchange
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_timeout() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out"
        ))
        .is_timeout());

        assert!(!TransportError::Connect("refused".into()).is_timeout());
        assert!(!TransportError::Body("reset".into()).is_timeout());
    }

    #[test]
    fn test_body_file_error_display() {
        let err = TransportError::BodyFile {
            path: PathBuf::from("/nope/body.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "open body file /nope/body.json: not found");
    }

    #[test]
    fn test_timeout_display() {
        let err = TransportError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timeout after 1.5s");
    }
}
