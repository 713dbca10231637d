//! Connection dialing
//!
//! A [`Dial`] turns a target address into an open byte stream. Dialers
//! compose: proxy dialers produce a tunnelled stream, and
//! [`CountingDialer`](crate::counting::CountingDialer) decorates any dialer
//! with byte accounting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use volley_core::{TargetAddr, TransportError};

/// Byte stream a dialer hands back
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

/// Type-erased [`Io`]
pub type BoxedIo = Box<dyn Io>;

/// Opens connections to a target
#[async_trait]
pub trait Dial: Send + Sync {
    /// Open a stream to `target`
    async fn dial(&self, target: &TargetAddr) -> Result<BoxedIo, TransportError>;
}

#[async_trait]
impl<D: Dial + ?Sized> Dial for Box<D> {
    async fn dial(&self, target: &TargetAddr) -> Result<BoxedIo, TransportError> {
        (**self).dial(target).await
    }
}

/// Plain TCP dialer
#[derive(Debug, Clone, Default)]
pub struct DirectDialer {
    timeout: Option<Duration>,
}

impl DirectDialer {
    /// Dialer bounded by `timeout` per connection attempt
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dial for DirectDialer {
    async fn dial(&self, target: &TargetAddr) -> Result<BoxedIo, TransportError> {
        let stream = within(self.timeout, connect_tcp(&target.host, target.port)).await?;
        Ok(Box::new(stream))
    }
}

/// Connect with `TCP_NODELAY` set
pub(crate) async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| TransportError::Connect(format!("{host}:{port}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run `fut` under an optional deadline
pub(crate) async fn within<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(TransportError::Timeout(limit))),
        None => fut.await,
    }
}
