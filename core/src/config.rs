//! Run configuration types
//!
//! [`RunOptions`] describes the single request a run fires over and over;
//! [`LoadConfig`] describes how hard and for how long it is fired.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Default interval between two ramp-up batches
pub const DEFAULT_RAMP_INTERVAL: Duration = Duration::from_secs(1);

/// Default cap on simultaneously open connections
pub const DEFAULT_MAX_CONNS: usize = 512;

// ============================================================================
// Request options
// ============================================================================

/// Where the request body comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// No body
    #[default]
    Empty,
    /// The same literal bytes on every request
    Bytes(Bytes),
    /// A file, opened afresh and streamed for every request
    File(PathBuf),
}

impl BodySource {
    /// Literal body, or [`BodySource::Empty`] when `bytes` is empty
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Bytes(bytes)
        }
    }
}

/// Immutable description of the request a run sends
///
/// Built once before the run starts; the client builder turns it into an
/// [`HttpClient`](crate::traits::HttpClient) plus a
/// [`RequestTemplate`](crate::request::RequestTemplate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Absolute target URL (`http` or `https`)
    pub url: String,

    /// HTTP method token
    pub method: String,

    /// Raw `name: value` header lines
    #[serde(default)]
    pub headers: Vec<String>,

    /// Request body
    #[serde(default)]
    pub body: BodySource,

    /// PEM client certificate chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,

    /// PEM private key matching `cert_path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure: bool,

    /// Maximum connections in use at once (0 = unlimited)
    pub max_conns: usize,

    /// Absolute deadline for a whole request/response exchange
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,

    /// Deadline for each socket read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,

    /// Deadline for each socket write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<Duration>,

    /// Deadline for establishing a connection, proxy handshake included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_timeout: Option<Duration>,

    /// SOCKS5 (`host:port`, `socks5://`) or HTTP (`http://`) proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Overrides the `Content-Type` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Overrides the `Host` header (and the TLS server name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl RunOptions {
    /// Options for a plain `GET` of `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: BodySource::Empty,
            cert_path: None,
            key_path: None,
            insecure: false,
            max_conns: DEFAULT_MAX_CONNS,
            request_timeout: None,
            read_timeout: None,
            write_timeout: None,
            dial_timeout: None,
            proxy: None,
            content_type: None,
            host: None,
        }
    }

    /// Set the method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Append a raw `name: value` header line
    pub fn with_header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(line.into());
        self
    }

    /// Set the body source
    pub fn with_body(mut self, body: BodySource) -> Self {
        self.body = body;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the proxy address
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set the host override
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the content type override
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Present a client certificate chain and key, both PEM files
    pub fn with_client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(cert.into());
        self.key_path = Some(key.into());
        self
    }

    /// Skip server certificate verification
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Cap concurrent connections, 0 for no cap
    pub fn with_max_conns(mut self, max_conns: usize) -> Self {
        self.max_conns = max_conns;
        self
    }

    /// Set the per-read socket timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the per-write socket timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the connect timeout
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Load shape
// ============================================================================

/// How many virtual users, how fast, and for how long
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Total request budget; zero or negative means unbounded
    pub requests: i64,

    /// Wall-clock limit for the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    /// Requests per second across all workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Workers started per ramp-up batch; zero starts everything at once
    pub ramp_up: usize,

    /// Pause between two ramp-up batches
    pub ramp_interval: Duration,

    /// Cancel the run on SIGINT/SIGTERM
    pub handle_signals: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            requests: -1,
            duration: None,
            rate: None,
            ramp_up: 0,
            ramp_interval: DEFAULT_RAMP_INTERVAL,
            handle_signals: true,
        }
    }
}

impl LoadConfig {
    /// Create a new config with the given concurrency
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Set the request budget
    pub fn with_requests(mut self, requests: i64) -> Self {
        self.requests = requests;
        self
    }

    /// Set the run duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the rate limit
    pub fn with_rate(mut self, rps: f64) -> Self {
        self.rate = Some(rps);
        self
    }

    /// Set the ramp-up batch size
    pub fn with_ramp_up(mut self, batch: usize) -> Self {
        self.ramp_up = batch;
        self
    }

    /// Set the pause between ramp-up batches
    pub fn with_ramp_interval(mut self, interval: Duration) -> Self {
        self.ramp_interval = interval;
        self
    }

    /// Enable or disable OS signal handling
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Budget as an option, `None` when unbounded
    pub fn request_budget(&self) -> Option<i64> {
        (self.requests > 0).then_some(self.requests)
    }

    /// Ramp batch size with the "unset" case resolved to the full concurrency
    pub fn effective_ramp_up(&self) -> usize {
        if self.ramp_up == 0 {
            self.concurrency
        } else {
            self.ramp_up
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "concurrency must be at least 1".into(),
            ));
        }

        if let Some(rps) = self.rate {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "rate must be a positive number, got {rps}"
                )));
            }
        }

        if let Some(duration) = self.duration {
            if duration.is_zero() {
                return Err(ConfigError::InvalidDuration(
                    "duration must be greater than zero".into(),
                ));
            }
        }

        if self.ramp_up > 0 && self.ramp_interval.is_zero() {
            return Err(ConfigError::InvalidRampUp(
                "ramp interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid concurrency value
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(String),

    /// Invalid rate limit
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Invalid run duration
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Invalid ramp-up settings
    #[error("Invalid ramp-up: {0}")]
    InvalidRampUp(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoadConfig::default();
        assert_eq!(config.concurrency, 1);
        assert!(config.request_budget().is_none());
        assert!(config.rate.is_none());
        assert!(config.handle_signals);
        assert_eq!(config.ramp_interval, DEFAULT_RAMP_INTERVAL);
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = LoadConfig::new(10)
            .with_requests(100)
            .with_duration(Duration::from_secs(60))
            .with_rate(100.0)
            .with_ramp_up(2);

        assert_eq!(config.concurrency, 10);
        assert_eq!(config.request_budget(), Some(100));
        assert_eq!(config.duration, Some(Duration::from_secs(60)));
        assert_eq!(config.rate, Some(100.0));
        assert_eq!(config.effective_ramp_up(), 2);
    }

    #[test]
    fn test_budget_non_positive_is_unbounded() {
        assert!(LoadConfig::new(1).with_requests(0).request_budget().is_none());
        assert!(LoadConfig::new(1).with_requests(-5).request_budget().is_none());
    }

    #[test]
    fn test_effective_ramp_up_defaults_to_concurrency() {
        assert_eq!(LoadConfig::new(7).effective_ramp_up(), 7);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = LoadConfig::new(10).with_requests(100).with_rate(50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let config = LoadConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency(_))
        ));
    }

    #[test]
    fn test_config_validation_bad_rate() {
        assert!(LoadConfig::new(1).with_rate(-10.0).validate().is_err());
        assert!(LoadConfig::new(1).with_rate(0.0).validate().is_err());
        assert!(LoadConfig::new(1).with_rate(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_ramp_interval() {
        let config = LoadConfig::new(4)
            .with_ramp_up(2)
            .with_ramp_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRampUp(_))
        ));
    }

    #[test]
    fn test_body_source_bytes_empty_is_empty() {
        assert_eq!(BodySource::bytes(Vec::new()), BodySource::Empty);
        assert_eq!(
            BodySource::bytes("hi"),
            BodySource::Bytes(Bytes::from_static(b"hi"))
        );
    }

    #[test]
    fn test_run_options_serialization() {
        let options = RunOptions::new("http://localhost:8080/")
            .with_method("POST")
            .with_header("X-Test: 1");

        let json = serde_json::to_string(&options).unwrap();
        let deserialized: RunOptions = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.method, "POST");
        assert_eq!(deserialized.headers, vec!["X-Test: 1".to_string()]);
        assert_eq!(deserialized.max_conns, DEFAULT_MAX_CONNS);
    }
}
