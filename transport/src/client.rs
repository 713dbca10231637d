//! hyper HTTP/1.1 client with a small connection pool
//!
//! Each connection is opened through the configured dialer, wrapped with
//! per-operation timeouts, upgraded to TLS for `https` targets and handed to
//! `hyper::client::conn::http1`. A connection goes back to the idle pool
//! once its response body has been read to the end.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::uri::PathAndQuery;
use http::{Request, Response, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use volley_core::{HttpClient, RequestBody, ResponseBody, TargetAddr, TransportError};

use crate::dial::{BoxedIo, Dial};
use crate::timeout::TimeoutIo;
use crate::tls::TlsSetup;

type ReqBody = UnsyncBoxBody<Bytes, io::Error>;
type Sender = http1::SendRequest<ReqBody>;

/// Connection settings for a [`HyperClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Per-read socket timeout
    pub read_timeout: Option<Duration>,
    /// Per-write socket timeout
    pub write_timeout: Option<Duration>,
    /// Concurrent connection cap, 0 for none
    pub max_conns: usize,
}

/// [`HttpClient`] backed by hyper's HTTP/1.1 connection API
pub struct HyperClient {
    dialer: Arc<dyn Dial>,
    tls: Option<TlsSetup>,
    target: TargetAddr,
    settings: ClientSettings,
    conn_builder: http1::Builder,
    idle: Arc<IdlePool>,
    slots: Option<Arc<Semaphore>>,
}

impl HyperClient {
    /// Client for `target`, dialing through `dialer`
    pub fn new(
        dialer: Arc<dyn Dial>,
        tls: Option<TlsSetup>,
        target: TargetAddr,
        settings: ClientSettings,
    ) -> Self {
        let mut conn_builder = http1::Builder::new();
        conn_builder.title_case_headers(true);

        let slots = (settings.max_conns > 0).then(|| Arc::new(Semaphore::new(settings.max_conns)));
        let idle = Arc::new(IdlePool::new(settings.max_conns));

        Self {
            dialer,
            tls,
            target,
            settings,
            conn_builder,
            idle,
            slots,
        }
    }

    /// Connections currently parked in the idle pool
    pub fn idle_connections(&self) -> usize {
        self.idle.len()
    }

    async fn checkout(&self) -> Result<Sender, TransportError> {
        while let Some(mut sender) = self.idle.take() {
            if sender.is_closed() {
                continue;
            }
            if sender.ready().await.is_ok() {
                return Ok(sender);
            }
        }
        self.connect().await
    }

    async fn connect(&self) -> Result<Sender, TransportError> {
        let io = self.dialer.dial(&self.target).await?;
        let io: BoxedIo = Box::new(TimeoutIo::new(
            io,
            self.settings.read_timeout,
            self.settings.write_timeout,
        ));
        let io = match &self.tls {
            Some(tls) => tls.connect(io).await?,
            None => io,
        };

        let (sender, conn) = self
            .conn_builder
            .handshake(TokioIo::new(io))
            .await
            .map_err(|e| from_hyper(e, TransportError::Http))?;

        let target = self.target.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                trace!(target = %target, error = %e, "connection closed with error");
            }
        });
        debug!(target = %self.target, tls = self.tls.is_some(), "opened connection");

        Ok(sender)
    }
}

#[async_trait]
impl HttpClient for HyperClient {
    fn name(&self) -> &str {
        "hyper"
    }

    async fn send(
        &self,
        request: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let permit = match &self.slots {
            Some(slots) => Some(
                slots
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| TransportError::Http("connection pool closed".to_string()))?,
            ),
            None => None,
        };

        let mut sender = self.checkout().await?;

        let (mut parts, body) = request.into_parts();
        parts.uri = origin_form(&parts.uri);
        let request = Request::from_parts(parts, hyper_body(body));

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| from_hyper(e, TransportError::Http))?;

        let (parts, incoming) = response.into_parts();
        let body = PooledBody {
            incoming,
            sender: Some(sender),
            idle: self.idle.clone(),
            permit,
        };
        Ok(Response::from_parts(parts, Box::pin(body)))
    }
}

impl fmt::Debug for HyperClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperClient")
            .field("target", &self.target)
            .field("tls", &self.tls)
            .field("settings", &self.settings)
            .field("idle", &self.idle.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Idle pool
// ============================================================================

struct IdlePool {
    senders: Mutex<Vec<Sender>>,
    max_idle: usize,
}

impl IdlePool {
    fn new(max_idle: usize) -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn take(&self) -> Option<Sender> {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn put(&self, sender: Sender) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        if self.max_idle == 0 || senders.len() < self.max_idle {
            senders.push(sender);
        }
    }

    fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Response body that parks its connection when fully read
///
/// Dropping it early closes the connection instead. The connection slot is
/// held until the body is done either way.
struct PooledBody {
    incoming: Incoming,
    sender: Option<Sender>,
    idle: Arc<IdlePool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Stream for PooledBody {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.incoming).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    // trailers are skipped
                    if let Ok(data) = frame.into_data() {
                        return Poll::Ready(Some(Ok(data)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.sender = None;
                    this.permit = None;
                    return Poll::Ready(Some(Err(from_hyper(e, TransportError::Body))));
                }
                Poll::Ready(None) => {
                    if let Some(sender) = this.sender.take() {
                        this.idle.put(sender);
                    }
                    this.permit = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn hyper_body(body: RequestBody) -> ReqBody {
    match body {
        RequestBody::Empty => Empty::new().map_err(|never| match never {}).boxed_unsync(),
        RequestBody::Bytes(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        file @ RequestBody::File(_) => {
            StreamBody::new(file.into_stream().map_ok(Frame::data)).boxed_unsync()
        }
    }
}

/// hyper's connection API expects the request target in origin form
fn origin_form(uri: &Uri) -> Uri {
    let path = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    Uri::from(path)
}

/// Surface socket failures (timeouts in particular) as I/O errors
fn from_hyper(err: hyper::Error, otherwise: fn(String) -> TransportError) -> TransportError {
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return TransportError::Io(io::Error::new(io_err.kind(), io_err.to_string()));
        }
        source = cause.source();
    }
    otherwise(err.to_string())
}
