//! Error types for volley-core
//!
//! Everything in here is a construction-time failure: it aborts the run
//! before a single worker is spawned. Failures of individual requests never
//! surface as an [`Error`]; they are written into the
//! [`ReportRecord`](crate::metrics::ReportRecord) of the attempt instead.

use thiserror::Error;

use crate::config::ConfigError;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Load or client configuration rejected by validation
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A required builder field was never set
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Target URL could not be parsed or uses an unsupported scheme
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL as given
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Header line is not of the form `name: value`
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Method token is not a valid HTTP method
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// Certificate or key material could not be loaded
    #[error("tls error: {0}")]
    Tls(String),

    /// Proxy address could not be understood
    #[error("proxy error: {0}")]
    Proxy(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidUrl`]
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`Error::Tls`]
    pub fn tls(reason: impl ToString) -> Self {
        Self::Tls(reason.to_string())
    }

    /// Shorthand for [`Error::Proxy`]
    pub fn proxy(reason: impl ToString) -> Self {
        Self::Proxy(reason.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
