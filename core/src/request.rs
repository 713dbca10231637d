//! Request template and request bodies
//!
//! The template is built once from [`RunOptions`] and copied into every
//! request a worker sends; header maps are never shared between requests.

use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, Request, Uri};
use tokio_util::io::ReaderStream;
use url::{Host, Url};

use crate::config::{BodySource, RunOptions};
use crate::error::{Error, Result};
use crate::traits::TransportError;

/// Port used for `http` targets without an explicit port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Port used for `https` targets without an explicit port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// `host:port` pair the transport dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    /// Domain or IP literal, without IPv6 brackets
    pub host: String,
    /// Resolved port, scheme default when the URL has none
    pub port: u16,
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Canonical request every worker copies
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    target: TargetAddr,
    tls: bool,
}

impl RequestTemplate {
    /// Build the template from run options
    ///
    /// # Errors
    /// Fails on an unparseable URL, a scheme other than `http`/`https`, an
    /// invalid method token or any header line without a colon.
    pub fn from_options(options: &RunOptions) -> Result<Self> {
        let url = Url::parse(&options.url).map_err(|e| Error::invalid_url(&options.url, e))?;

        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(Error::invalid_url(
                    &options.url,
                    format!("unsupported scheme {other:?}"),
                ))
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::invalid_url(&options.url, "missing host")),
        };
        let port = url.port().unwrap_or(if tls {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        });

        // url.host_str() keeps IPv6 brackets; url.port() is None for default ports
        let authority = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        let mut path_and_query = url.path().to_string();
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        let uri: Uri = format!("{}://{}{}", url.scheme(), authority, path_and_query)
            .parse()
            .map_err(|e| Error::invalid_url(&options.url, e))?;

        let method = Method::from_bytes(options.method.as_bytes())
            .map_err(|_| Error::InvalidMethod(options.method.clone()))?;

        let mut headers = HeaderMap::new();
        if let Some(content_type) = &options.content_type {
            headers.insert(CONTENT_TYPE, header_value(content_type)?);
        }
        let host_header = options.host.as_deref().unwrap_or(&authority);
        headers.insert(HOST, header_value(host_header)?);

        for line in &options.headers {
            let (name, value) = parse_header_line(line)?;
            headers.insert(name, value);
        }

        Ok(Self {
            method,
            uri,
            headers,
            target: TargetAddr { host, port },
            tls,
        })
    }

    /// A fresh request carrying `body` and a private copy of the headers
    pub fn request(&self, body: RequestBody) -> Request<RequestBody> {
        let mut request = Request::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Template headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Address the transport connects to
    pub fn target(&self) -> &TargetAddr {
        &self.target
    }

    /// Whether the target is `https`
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Name presented for SNI and certificate verification
    ///
    /// Always the dialed host; a Host header override does not change it.
    pub fn server_name(&self) -> &str {
        &self.target.host
    }
}

/// Split a raw `name: value` line on its first colon
///
/// # Errors
/// Returns [`Error::InvalidHeader`] when there is no colon or the name or
/// value contain bytes not allowed in a header.
pub fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHeader(line.to_string()))?;

    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| Error::InvalidHeader(line.to_string()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|_| Error::InvalidHeader(line.to_string()))?;

    Ok((name, value))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(value.to_string()))
}

// ============================================================================
// Request body
// ============================================================================

/// Body of a single request
///
/// File bodies are streamed in chunks straight from disk.
pub enum RequestBody {
    /// No body
    Empty,
    /// Literal bytes, cheap to clone per request
    Bytes(Bytes),
    /// Freshly opened file handle
    File(tokio::fs::File),
}

impl RequestBody {
    /// Exact length when known up front
    pub fn exact_len(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::File(_) => None,
        }
    }

    /// Consume the body as a stream of chunks
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self {
            RequestBody::Empty => stream::empty().boxed(),
            RequestBody::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            RequestBody::File(file) => ReaderStream::new(file).boxed(),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::File(_) => f.write_str("File"),
        }
    }
}

impl BodySource {
    /// Produce the body for one attempt, opening the file afresh if needed
    ///
    /// # Errors
    /// Returns [`TransportError::BodyFile`] when the file cannot be opened.
    pub async fn open(&self) -> std::result::Result<RequestBody, TransportError> {
        match self {
            BodySource::Empty => Ok(RequestBody::Empty),
            BodySource::Bytes(bytes) => Ok(RequestBody::Bytes(bytes.clone())),
            BodySource::File(path) => tokio::fs::File::open(path)
                .await
                .map(RequestBody::File)
                .map_err(|source| TransportError::BodyFile {
                    path: path.clone(),
                    source,
                }),
        }
    }
}
