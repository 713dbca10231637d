//! Bounded record channel between workers and the consumer
//!
//! Closing is decoupled from dropping senders: the lifecycle controller can
//! close the channel while workers are still mid-request. From then on every
//! send is refused by an explicit check of the [`CloseGuard`], and the
//! receiver drains what is already buffered before reporting the end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::metrics::{RecordPool, ReportRecord};

/// Upper bound on the record buffer
pub const MAX_RECORD_BUFFER: usize = 8192;

/// Buffered records per worker before the ceiling applies
pub const RECORDS_PER_WORKER: usize = 100;

/// Channel buffer configuration for record delivery
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Record channel buffer size (workers -> consumer)
    pub record_buffer: usize,
}

impl ChannelConfig {
    /// Buffer sized for `concurrency` workers: `min(8192, concurrency * 100)`
    pub fn for_concurrency(concurrency: usize) -> Self {
        Self {
            record_buffer: concurrency
                .saturating_mul(RECORDS_PER_WORKER)
                .clamp(1, MAX_RECORD_BUFFER),
        }
    }

    /// Override the buffer size
    pub fn with_record_buffer(mut self, size: usize) -> Self {
        self.record_buffer = size.max(1);
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::for_concurrency(1)
    }
}

// ============================================================================
// Close guard
// ============================================================================

/// One-shot "channel closed" flag that can also be awaited
#[derive(Debug, Clone, Default)]
pub struct CloseGuard {
    closed: Arc<AtomicBool>,
    notify: CancellationToken,
}

impl CloseGuard {
    /// A guard in the open state
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the channel; returns `true` only for the call that closed it
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.notify.cancel();
        }
        first
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the channel is closed
    pub async fn closed(&self) {
        self.notify.cancelled().await
    }
}

// ============================================================================
// Sender / receiver
// ============================================================================

/// What happened to a record handed to [`RecordSender::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The record is in the buffer
    Delivered,
    /// The channel was closed first; the record was dropped
    Closed,
    /// The consumer went away; the record was dropped
    Disconnected,
}

/// Create a record channel guarded by `guard`
pub fn record_channel(
    config: &ChannelConfig,
    guard: CloseGuard,
    pool: Arc<RecordPool>,
) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(config.record_buffer);
    (
        RecordSender {
            tx,
            guard: guard.clone(),
        },
        RecordReceiver { rx, guard, pool },
    )
}

/// Worker side of the record channel
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<ReportRecord>,
    guard: CloseGuard,
}

impl RecordSender {
    /// Send a record, waiting for buffer space
    ///
    /// A close that happens before or while waiting wins over the send, so
    /// nothing enters the buffer after the channel was closed.
    pub async fn send(&self, record: ReportRecord) -> SendOutcome {
        if self.guard.is_closed() {
            return SendOutcome::Closed;
        }

        tokio::select! {
            biased;

            _ = self.guard.closed() => SendOutcome::Closed,

            result = self.tx.send(record) => match result {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => SendOutcome::Disconnected,
            },
        }
    }
}

/// Consumer side of the record channel
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<ReportRecord>,
    guard: CloseGuard,
    pool: Arc<RecordPool>,
}

impl RecordReceiver {
    /// Next record, or `None` once the channel is closed and drained
    pub async fn recv(&mut self) -> Option<ReportRecord> {
        tokio::select! {
            biased;

            record = self.rx.recv() => record,

            _ = self.guard.closed() => self.rx.try_recv().ok(),
        }
    }

    /// Hand a consumed record back for reuse by the workers
    pub fn recycle(&self, record: ReportRecord) {
        self.pool.release(record);
    }

    /// Whether the producing side has closed the channel
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(buffer: usize) -> (RecordSender, RecordReceiver, CloseGuard) {
        let guard = CloseGuard::new();
        let config = ChannelConfig::default().with_record_buffer(buffer);
        let (tx, rx) = record_channel(&config, guard.clone(), Arc::new(RecordPool::default()));
        (tx, rx, guard)
    }

    #[test]
    fn test_channel_config_for_concurrency() {
        assert_eq!(ChannelConfig::for_concurrency(1).record_buffer, 100);
        assert_eq!(ChannelConfig::for_concurrency(50).record_buffer, 5000);
        assert_eq!(ChannelConfig::for_concurrency(82).record_buffer, 8192);
        assert_eq!(ChannelConfig::for_concurrency(10_000).record_buffer, 8192);
        assert_eq!(ChannelConfig::for_concurrency(0).record_buffer, 1);
    }

    #[test]
    fn test_channel_config_builder() {
        let config = ChannelConfig::default().with_record_buffer(5000);
        assert_eq!(config.record_buffer, 5000);
    }

    #[test]
    fn test_close_guard_closes_once() {
        let guard = CloseGuard::new();
        assert!(!guard.is_closed());
        assert!(guard.close());
        assert!(!guard.close());
        assert!(guard.is_closed());
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (tx, mut rx, _guard) = channel(4);
        let record = ReportRecord {
            code: 200,
            ..Default::default()
        };
        assert_eq!(tx.send(record).await, SendOutcome::Delivered);
        assert_eq!(rx.recv().await.map(|r| r.code), Some(200));
    }

    #[tokio::test]
    async fn test_send_after_close_is_refused() {
        let (tx, mut rx, guard) = channel(4);
        guard.close();
        assert_eq!(tx.send(ReportRecord::default()).await, SendOutcome::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_receiver_drains_buffer_after_close() {
        let (tx, mut rx, guard) = channel(4);
        for code in [200, 201] {
            let record = ReportRecord {
                code,
                ..Default::default()
            };
            assert_eq!(tx.send(record).await, SendOutcome::Delivered);
        }
        guard.close();

        assert_eq!(rx.recv().await.map(|r| r.code), Some(200));
        assert_eq!(rx.recv().await.map(|r| r.code), Some(201));
        assert!(rx.recv().await.is_none());
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn test_blocked_send_released_by_close() {
        let (tx, _rx, guard) = channel(1);
        assert_eq!(tx.send(ReportRecord::default()).await, SendOutcome::Delivered);

        let pending = tokio::spawn({
            let tx = tx.clone();
            async move { tx.send(ReportRecord::default()).await }
        });
        tokio::task::yield_now().await;
        guard.close();

        assert_eq!(pending.await.unwrap(), SendOutcome::Closed);
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver() {
        let (tx, rx, _guard) = channel(1);
        drop(rx);
        assert_eq!(
            tx.send(ReportRecord::default()).await,
            SendOutcome::Disconnected
        );
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_dropped() {
        let (tx, mut rx, _guard) = channel(1);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recycle_returns_record_to_pool() {
        let guard = CloseGuard::new();
        let pool = Arc::new(RecordPool::new(8));
        let (_tx, rx) = record_channel(&ChannelConfig::default(), guard, Arc::clone(&pool));
        rx.recycle(ReportRecord::default());
        assert_eq!(pool.idle(), 1);
    }
}
