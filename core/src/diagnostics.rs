//! Side channel for server error responses
//!
//! Every response with a 5xx status is mirrored here: a short banner, the
//! status line and headers, then the body as it streams in.
//!
//! Writes never touch the sink on a runtime worker thread. They are queued
//! on a bounded channel and drained by one blocking writer, started on the
//! first write; a full queue makes the writing worker wait.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use tokio::sync::{mpsc, oneshot};

/// Queued writes before workers start waiting on the sink
pub const WRITE_QUEUE: usize = 256;

enum Entry {
    Data(Bytes),
    Flush(oneshot::Sender<io::Result<()>>),
}

type Sink = Box<dyn Write + Send>;

/// Shared writer for 5xx diagnostics
///
/// Each call is written as one piece; a dump from one worker may
/// interleave with another's between calls.
pub struct ServerErrorLog {
    // None for the discarding log
    sink: Mutex<Option<Sink>>,
    discard: bool,
    queue: OnceLock<mpsc::Sender<Entry>>,
}

impl ServerErrorLog {
    /// Log into an arbitrary writer
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Some(Box::new(sink))),
            discard: false,
            queue: OnceLock::new(),
        }
    }

    /// Log to standard error
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Drop everything
    pub fn discard() -> Self {
        Self {
            sink: Mutex::new(None),
            discard: true,
            queue: OnceLock::new(),
        }
    }

    /// Queue the banner, status line and headers of a 5xx response
    pub async fn log_head(
        &self,
        status: StatusCode,
        elapsed: Duration,
        version: Version,
        headers: &HeaderMap,
    ) -> io::Result<()> {
        if self.discard {
            return Ok(());
        }
        let mut head = format!("\n{} {:?}\n", status.as_u16(), elapsed);
        head.push_str(&format!("{version:?} {status}\r\n"));
        for (name, value) in headers {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(&String::from_utf8_lossy(value.as_bytes()));
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        self.enqueue(Entry::Data(Bytes::from(head))).await
    }

    /// Queue one chunk of a 5xx response body
    pub async fn write_body(&self, chunk: Bytes) -> io::Result<()> {
        if self.discard {
            return Ok(());
        }
        self.enqueue(Entry::Data(chunk)).await
    }

    /// Wait until everything queued so far has reached the sink, then flush it
    pub async fn flush(&self) -> io::Result<()> {
        if self.discard || self.queue.get().is_none() {
            return Ok(());
        }
        let (ack, done) = oneshot::channel();
        self.enqueue(Entry::Flush(ack)).await?;
        done.await.unwrap_or_else(|_| Err(writer_gone()))
    }

    async fn enqueue(&self, entry: Entry) -> io::Result<()> {
        self.queue()
            .send(entry)
            .await
            .map_err(|_| writer_gone())
    }

    fn queue(&self) -> &mpsc::Sender<Entry> {
        self.queue.get_or_init(|| {
            let (tx, rx) = mpsc::channel(WRITE_QUEUE);
            let sink = self
                .sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(sink) = sink {
                tokio::task::spawn_blocking(move || drain(sink, rx));
            }
            tx
        })
    }
}

fn drain(mut sink: Sink, mut rx: mpsc::Receiver<Entry>) {
    while let Some(entry) = rx.blocking_recv() {
        match entry {
            Entry::Data(bytes) => {
                if let Err(e) = sink.write_all(&bytes) {
                    tracing::debug!(error = %e, "Failed to write server error diagnostics");
                }
            }
            Entry::Flush(ack) => {
                let _ = ack.send(sink.flush());
            }
        }
    }
    let _ = sink.flush();
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "diagnostics writer has stopped")
}

impl Default for ServerErrorLog {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for ServerErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerErrorLog")
            .field("discard", &self.discard)
            .field("started", &self.queue.get().is_some())
            .finish()
    }
}
