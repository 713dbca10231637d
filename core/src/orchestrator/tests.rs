//! Tests for the Requester module

use super::builder::RequesterBuilder;
use super::executor::Requester;
use crate::capability::ClientCapability;
use crate::channel::RecordReceiver;
use crate::config::{LoadConfig, RunOptions};
use crate::diagnostics::ServerErrorLog;
use crate::error::Error;
use crate::lifecycle::{RunState, StopReason};
use crate::metrics::{ByteCounters, ReportRecord};
use crate::request::{RequestBody, RequestTemplate};
use crate::traits::{HttpClient, ResponseBody, TransportError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Mock HttpClient
// ============================================================================

struct MockClient {
    delay: Option<Duration>,
    counters: ByteCounters,
    calls: AtomicUsize,
}

impl MockClient {
    fn new() -> Self {
        Self {
            delay: None,
            counters: ByteCounters::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        _request: http::Request<RequestBody>,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.counters.add_written(40);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.add_read(60);

        let body: ResponseBody = Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"hello"))]));
        Ok(http::Response::builder().status(200).body(body).unwrap())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn capability(client: Arc<MockClient>) -> ClientCapability {
    let options = RunOptions::new("http://127.0.0.1:9/");
    let template = RequestTemplate::from_options(&options).unwrap();
    let counters = client.counters.clone();
    ClientCapability::new(client, template, &options, counters)
}

fn requester(client: Arc<MockClient>, load: LoadConfig) -> (Requester, RecordReceiver) {
    RequesterBuilder::new()
        .load(load.with_signal_handling(false))
        .capability(capability(client))
        .diagnostics(ServerErrorLog::discard())
        .build()
        .unwrap()
}

fn consume(mut records: RecordReceiver) -> tokio::task::JoinHandle<Vec<ReportRecord>> {
    tokio::spawn(async move {
        let mut out = Vec::new();
        while let Some(record) = records.recv().await {
            out.push(record);
        }
        out
    })
}

// ============================================================================
// Builder tests
// ============================================================================

#[test]
fn test_builder_missing_client() {
    let result = RequesterBuilder::new().load(LoadConfig::new(2)).build();
    assert!(matches!(result, Err(Error::MissingConfig("client"))));
}

#[test]
fn test_builder_validates_load() {
    let result = RequesterBuilder::new()
        .concurrency(0)
        .capability(capability(Arc::new(MockClient::new())))
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_requester_debug_and_state() {
    let (requester, _records) = requester(Arc::new(MockClient::new()), LoadConfig::new(3));
    assert_eq!(requester.state(), RunState::Running);
    assert_eq!(requester.load().concurrency, 3);
    let debug = format!("{requester:?}");
    assert!(debug.contains("mock"));
    assert!(debug.contains("127.0.0.1:9"));
}

// ============================================================================
// Run tests
// ============================================================================

#[tokio::test]
async fn test_run_stops_when_budget_is_spent() {
    let client = Arc::new(MockClient::new());
    let (requester, records) = requester(client.clone(), LoadConfig::new(4).with_requests(10));
    let consumer = consume(records);

    let stats = requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(stats.stop_reason, Some(StopReason::BudgetExhausted));
    assert_eq!(stats.workers, 4);
    assert_eq!(stats.attempts, 10);
    assert_eq!(client.calls(), 10);
    // budget exhaustion lets in-flight records through
    assert_eq!(records.len(), 10);
    assert_eq!(stats.dropped, 0);
    assert!(records.iter().all(|r| r.code == 200));
}

#[tokio::test]
async fn test_run_stops_at_deadline() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(5)));
    let load = LoadConfig::new(2).with_duration(Duration::from_millis(100));
    let (requester, records) = requester(client, load);
    let consumer = consume(records);

    let start = Instant::now();
    let stats = requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(stats.stop_reason, Some(StopReason::Deadline));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!records.is_empty());
    assert_eq!(records.len() + stats.dropped, stats.attempts);
}

#[tokio::test]
async fn test_run_stops_on_external_cancel() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(2)));
    let (requester, records) = requester(client, LoadConfig::new(3));
    let canceller = requester.canceller();
    let consumer = consume(records);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let stats = requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(stats.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(records.len(), stats.attempts);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn test_ramp_reaches_target_concurrency() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(2)));
    let load = LoadConfig::new(4)
        .with_ramp_up(2)
        .with_ramp_interval(Duration::from_millis(20))
        .with_duration(Duration::from_millis(150));
    let (requester, records) = requester(client, load);
    let consumer = consume(records);

    let stats = requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(stats.workers, 4);
    let max_seen = records.iter().map(|r| r.concurrency).max().unwrap();
    assert!(max_seen <= 4);
    // first records come from the first batch only
    assert!(records[0].concurrency <= 2);
}

#[tokio::test]
async fn test_uneven_ramp_spawns_one_extra_worker() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(2)));
    let load = LoadConfig::new(5)
        .with_ramp_up(2)
        .with_ramp_interval(Duration::from_millis(10))
        .with_duration(Duration::from_millis(150));
    let (requester, records) = requester(client, load);
    let consumer = consume(records);

    let stats = requester.run().await;
    consumer.await.unwrap();

    assert_eq!(stats.workers, 6);
}

#[tokio::test]
async fn test_cancel_during_ramp_pause_stops_spawning() {
    let client = Arc::new(MockClient::new().with_delay(Duration::from_millis(2)));
    let load = LoadConfig::new(4)
        .with_ramp_up(1)
        .with_ramp_interval(Duration::from_secs(30));
    let (requester, records) = requester(client, load);
    let canceller = requester.canceller();
    let consumer = consume(records);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let stats = requester.run().await;
    consumer.await.unwrap();

    assert_eq!(stats.workers, 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_rate_limit_paces_the_whole_pool() {
    let client = Arc::new(MockClient::new());
    let load = LoadConfig::new(4).with_requests(5).with_rate(50.0);
    let (requester, records) = requester(client, load);
    let consumer = consume(records);

    let start = Instant::now();
    let stats = requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(stats.attempts, 5);
    // five tokens at 20ms spacing, the first one free
    assert!(start.elapsed() >= Duration::from_millis(75));
}

#[tokio::test]
async fn test_byte_counters_never_decrease_per_worker() {
    let client = Arc::new(MockClient::new());
    let counters = client.counters.clone();
    let (requester, records) = requester(client, LoadConfig::new(1).with_requests(20));
    let consumer = consume(records);

    requester.run().await;
    let records = consumer.await.unwrap();

    assert_eq!(records.len(), 20);
    for pair in records.windows(2) {
        assert!(pair[1].read_bytes >= pair[0].read_bytes);
        assert!(pair[1].write_bytes >= pair[0].write_bytes);
    }
    assert_eq!(counters.read(), 20 * 60);
    assert_eq!(counters.written(), 20 * 40);
}

#[tokio::test]
async fn test_channel_closed_when_run_returns() {
    let client = Arc::new(MockClient::new());
    let (requester, mut records) = requester(client, LoadConfig::new(2).with_requests(4));
    let canceller = requester.canceller();

    let consumer = tokio::spawn(async move {
        let mut n = 0;
        while records.recv().await.is_some() {
            n += 1;
        }
        n
    });

    requester.run().await;
    assert_eq!(canceller.state(), RunState::Closed);
    assert_eq!(consumer.await.unwrap(), 4);
}
