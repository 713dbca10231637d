//! Per-operation read and write deadlines
//!
//! The deadline is armed when an operation first returns `Pending` and
//! cleared as soon as it completes. A read or write that stalls for longer
//! than the limit fails with [`io::ErrorKind::TimedOut`].
//!
//! hyper keeps a read pending on idle keep-alive connections. Writing the
//! next request restarts the read deadline, so idle time is never charged
//! to the response; a pooled connection left idle past the read timeout is
//! still closed.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Sleep};

#[derive(Debug)]
struct Deadline {
    limit: Option<Duration>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    fn new(limit: Option<Duration>) -> Self {
        Self { limit, timer: None }
    }

    /// Drop an armed timer; the next pending poll starts a fresh one
    fn restart(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Track the outcome of one poll, failing once the armed timer fires
    fn check<T>(
        &mut self,
        cx: &mut Context<'_>,
        poll: Poll<io::Result<T>>,
        op: &str,
    ) -> Poll<io::Result<T>> {
        let Some(limit) = self.limit else {
            return poll;
        };
        if poll.is_ready() {
            self.timer = None;
            return poll;
        }

        let timer = self.timer.get_or_insert_with(|| Box::pin(sleep(limit)));
        match timer.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.timer = None;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{op} timed out after {limit:?}"),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Stream with independent read and write deadlines
#[derive(Debug)]
pub struct TimeoutIo<S> {
    inner: S,
    read: Deadline,
    write: Deadline,
}

impl<S> TimeoutIo<S> {
    /// Wrap `inner`; `None` disables the corresponding deadline
    pub fn new(inner: S, read_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            read: Deadline::new(read_timeout),
            write: Deadline::new(write_timeout),
        }
    }

    /// Bytes went out, so a response may follow: restart the read deadline
    ///
    /// The pending read is woken to re-arm its timer from now.
    /// Flushes do not count: hyper flushes on every wakeup, idle or not.
    fn wrote(&mut self, cx: &mut Context<'_>, poll: &Poll<io::Result<usize>>) {
        if matches!(poll, Poll::Ready(Ok(n)) if *n > 0) && self.read.restart() {
            cx.waker().wake_by_ref();
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimeoutIo<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        this.read.check(cx, poll, "read")
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimeoutIo<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        let poll = this.write.check(cx, poll, "write");
        this.wrote(cx, &poll);
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        let poll = this.write.check(cx, poll, "write");
        this.wrote(cx, &poll);
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        this.write.check(cx, poll, "flush")
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
