//! Byte accounting for connections
//!
//! Every stream produced by the client's dialer is wrapped in a
//! [`CountingStream`], so the run-wide [`ByteCounters`] see the raw bytes on
//! the wire, TLS records and proxy handshakes included.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use volley_core::{ByteCounters, TargetAddr, TransportError};

use crate::dial::{BoxedIo, Dial};

/// Stream that adds every byte moved through it to shared counters
#[derive(Debug)]
pub struct CountingStream<S> {
    inner: S,
    counters: ByteCounters,
}

impl<S> CountingStream<S> {
    /// Wrap `inner`
    pub fn new(inner: S, counters: ByteCounters) -> Self {
        Self { inner, counters }
    }

    /// Unwrap the inner stream
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CountingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            self.counters.add_read(n as u64);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CountingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.counters.add_written(n as u64);
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = poll {
            self.counters.add_written(n as u64);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Dialer decorator that counts bytes on every connection it opens
pub struct CountingDialer<D> {
    inner: D,
    counters: ByteCounters,
}

impl<D> CountingDialer<D> {
    /// Wrap `inner`
    pub fn new(inner: D, counters: ByteCounters) -> Self {
        Self { inner, counters }
    }
}

#[async_trait]
impl<D: Dial> Dial for CountingDialer<D> {
    async fn dial(&self, target: &TargetAddr) -> Result<BoxedIo, TransportError> {
        let io = self.inner.dial(target).await?;
        Ok(Box::new(CountingStream::new(io, self.counters.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_counts_both_directions() {
        let (client, mut server) = tokio::io::duplex(64);
        let counters = ByteCounters::new();
        let mut counted = CountingStream::new(client, counters.clone());

        counted.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();

        server.write_all(b"worldwide").await.unwrap();
        let mut back = [0u8; 9];
        counted.read_exact(&mut back).await.unwrap();

        assert_eq!(counters.written(), 5);
        assert_eq!(counters.read(), 9);
    }

    #[tokio::test]
    async fn test_eof_adds_nothing() {
        let (client, server) = tokio::io::duplex(8);
        drop(server);
        let counters = ByteCounters::new();
        let mut counted = CountingStream::new(client, counters.clone());

        let mut buf = Vec::new();
        counted.read_to_end(&mut buf).await.unwrap();
        assert_eq!(counters.read(), 0);
    }

    #[tokio::test]
    async fn test_counters_shared_across_streams() {
        let counters = ByteCounters::new();
        let (a, mut a_peer) = tokio::io::duplex(16);
        let (b, mut b_peer) = tokio::io::duplex(16);
        let mut a = CountingStream::new(a, counters.clone());
        let mut b = CountingStream::new(b, counters.clone());

        a.write_all(b"12").await.unwrap();
        b.write_all(b"345").await.unwrap();
        let mut sink = [0u8; 3];
        a_peer.read_exact(&mut sink[..2]).await.unwrap();
        b_peer.read_exact(&mut sink).await.unwrap();

        assert_eq!(counters.written(), 5);
    }
}
