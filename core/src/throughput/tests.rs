//! Tests for the open-loop producer and consumer drivers

use super::*;
use crate::config::{ErrorPolicy, ThroughputConfig};
use crate::error::BenchErrorKind;
use crate::traits::{RequestError, Role, StreamBenchmark};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Mock StreamBenchmark
// ============================================================================

/// Stream backend wired to a local channel
///
/// The producer side pushes into `tx`; the consumer side hands out `rx`.
/// `delivered` counts what actually reached the channel, independently of the
/// driver's own tally.
struct MockStream {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    rx: Option<mpsc::Receiver<Vec<u8>>>,
    fail_at: Option<u64>,
    fail_setup: bool,
    attempts: u64,
    delivered: Arc<AtomicU64>,
    soft_errors: u64,
}

impl MockStream {
    fn producer(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx: None,
            fail_at: None,
            fail_setup: false,
            attempts: 0,
            delivered: Arc::new(AtomicU64::new(0)),
            soft_errors: 0,
        }
    }

    fn consumer(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            tx: None,
            rx: Some(rx),
            fail_at: None,
            fail_setup: false,
            attempts: 0,
            delivered: Arc::new(AtomicU64::new(0)),
            soft_errors: 0,
        }
    }

    fn with_fail_at(mut self, message: u64) -> Self {
        self.fail_at = Some(message);
        self
    }

    fn with_failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    fn with_soft_errors(mut self, errors: u64) -> Self {
        self.soft_errors = errors;
        self
    }
}

#[async_trait]
impl StreamBenchmark for MockStream {
    fn name(&self) -> &str {
        "mock-stream"
    }

    async fn setup(&mut self, _role: Role, _message_count: u64) -> Result<(), RequestError> {
        if self.fail_setup {
            return Err(RequestError::Connection("broker unreachable".to_string()));
        }
        Ok(())
    }

    async fn send(&mut self) -> Result<(), RequestError> {
        self.attempts += 1;
        if self.fail_at == Some(self.attempts) {
            return Err(RequestError::Closed("broker went away".to_string()));
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RequestError::Other("not a producer".to_string()))?;
        tx.send(crate::payload::sequenced_payload(self.attempts, 16))
            .await
            .map_err(|_| RequestError::Closed("channel closed".to_string()))?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_done(&mut self) -> Result<(), RequestError> {
        Ok(())
    }

    fn take_receiver(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.rx.take()
    }

    fn errors(&self) -> u64 {
        self.soft_errors
    }
}

// ============================================================================
// Producer Tests
// ============================================================================

#[tokio::test]
async fn test_producer_sends_configured_count() {
    let (tx, mut rx) = mpsc::channel(256);
    let stream = MockStream::producer(tx);
    let delivered = Arc::clone(&stream.delivered);

    let drain_handle = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let mut producer = Producer::new(
        Box::new(stream),
        ThroughputConfig::new(500, ErrorPolicy::Include),
    );
    assert_eq!(producer.state(), DriverState::Idle);

    let report = producer.run().await.unwrap();

    assert_eq!(producer.state(), DriverState::Done);
    assert_eq!(report.role, Role::Producer);
    assert_eq!(report.messages, 500);
    assert_eq!(report.messages, delivered.load(Ordering::SeqCst));
    assert!(report.completed);
    assert_eq!(report.errors, 0);

    drop(producer);
    drain_handle.await.unwrap();
}

#[tokio::test]
async fn test_producer_aborts_on_send_failure() {
    let (tx, _rx) = mpsc::channel(256);
    let stream = MockStream::producer(tx).with_fail_at(50);

    let mut producer = Producer::new(
        Box::new(stream),
        ThroughputConfig::new(100, ErrorPolicy::Include),
    );
    let err = producer.run().await.unwrap_err();

    assert_eq!(err.kind, BenchErrorKind::Send);
    assert_eq!(err.sent, Some(49));
    assert_eq!(producer.sent(), 49);
    assert_eq!(producer.state(), DriverState::Done);
}

#[tokio::test]
async fn test_producer_setup_failure() {
    let (tx, _rx) = mpsc::channel(1);
    let stream = MockStream::producer(tx).with_failing_setup();

    let mut producer = Producer::new(
        Box::new(stream),
        ThroughputConfig::new(10, ErrorPolicy::Include),
    );
    let err = producer.run().await.unwrap_err();

    assert!(err.is_setup());
    assert!(err.message.contains("broker unreachable"));
    assert_eq!(producer.state(), DriverState::Idle);
}

#[tokio::test]
async fn test_producer_rejects_zero_messages() {
    let (tx, _rx) = mpsc::channel(1);
    let mut producer = Producer::new(
        Box::new(MockStream::producer(tx)),
        ThroughputConfig::new(0, ErrorPolicy::Include),
    );
    assert_eq!(producer.run().await.unwrap_err().kind, BenchErrorKind::Config);
}

// ============================================================================
// Consumer Tests
// ============================================================================

#[tokio::test]
async fn test_consumer_receives_configured_count() {
    let (tx, rx) = mpsc::channel(256);
    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx)),
        ThroughputConfig::new(200, ErrorPolicy::Include),
    );

    let sender = tokio::spawn(async move {
        for seq in 0..200u64 {
            tx.send(crate::payload::sequenced_payload(seq, 16))
                .await
                .unwrap();
            if seq % 50 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    });

    let report = consumer.run().await.unwrap();
    sender.await.unwrap();

    assert_eq!(consumer.state(), DriverState::Done);
    assert_eq!(report.role, Role::Consumer);
    assert_eq!(report.messages, 200);
    assert!(report.completed);
    assert!(report.elapsed > Duration::ZERO);
    assert!(report.throughput().is_some_and(|r| r > 0.0));
}

#[tokio::test]
async fn test_consumer_timer_starts_at_first_message() {
    let (tx, rx) = mpsc::channel(16);
    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx)),
        ThroughputConfig::new(2, ErrorPolicy::Include),
    );

    let sender = tokio::spawn(async move {
        // Idle before the first message is not measured
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(vec![0u8; 16]).await.unwrap();
        tx.send(vec![0u8; 16]).await.unwrap();
    });

    let report = consumer.run().await.unwrap();
    sender.await.unwrap();

    assert!(report.completed);
    assert!(report.elapsed < Duration::from_millis(100));
}

#[tokio::test]
async fn test_single_message_has_no_rate() {
    let (tx, rx) = mpsc::channel(1);
    tx.send(vec![0u8; 16]).await.unwrap();

    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx)),
        ThroughputConfig::new(1, ErrorPolicy::Include),
    );
    let report = consumer.run().await.unwrap();

    assert!(report.completed);
    assert_eq!(report.messages, 1);
    assert_eq!(report.elapsed, Duration::ZERO);
    assert_eq!(report.throughput(), None);
    assert!(report.to_string().contains("n/a msg/s"));
    drop(tx);
}

#[tokio::test]
async fn test_consumer_closed_channel_is_partial() {
    let (tx, rx) = mpsc::channel(16);
    for _ in 0..3 {
        tx.send(vec![1u8; 16]).await.unwrap();
    }
    drop(tx);

    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx)),
        ThroughputConfig::new(10, ErrorPolicy::Include),
    );
    let report = consumer.run().await.unwrap();

    assert_eq!(report.messages, 3);
    assert!(!report.completed);
    assert!(report.is_degraded());
}

#[tokio::test]
async fn test_consumer_reports_backend_errors_under_policy() {
    let (tx, rx) = mpsc::channel(16);
    for _ in 0..10 {
        tx.send(vec![1u8; 16]).await.unwrap();
    }

    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx).with_soft_errors(4)),
        ThroughputConfig::new(10, ErrorPolicy::Exclude),
    );
    let report = consumer.run().await.unwrap();

    assert_eq!(report.messages, 10);
    assert_eq!(report.errors, 4);
    assert_eq!(report.counted_messages(), 6);
    assert!(report.completed);
    drop(tx);
}

#[tokio::test]
async fn test_consumer_without_receiver_is_setup_error() {
    let mut stream = MockStream::consumer(mpsc::channel(1).1);
    stream.rx = None;

    let mut consumer = Consumer::new(
        Box::new(stream),
        ThroughputConfig::new(10, ErrorPolicy::Include),
    );
    assert!(consumer.run().await.unwrap_err().is_setup());
}

// ============================================================================
// Producer + Consumer
// ============================================================================

#[tokio::test]
async fn test_send_failure_leaves_consumer_partial() {
    let (tx, rx) = mpsc::channel(256);
    let config = ThroughputConfig::new(100, ErrorPolicy::Include);

    let mut consumer = Consumer::new(
        Box::new(MockStream::consumer(rx)),
        config.clone().with_recv_timeout(Duration::from_millis(200)),
    );
    let receiver = consumer.subscribe().await.unwrap();
    let consumer_handle = tokio::spawn(async move { consumer.run_subscribed(receiver).await });

    let mut producer = Producer::new(
        Box::new(MockStream::producer(tx).with_fail_at(50)),
        config,
    );
    let err = producer.run().await.unwrap_err();
    assert_eq!(err.kind, BenchErrorKind::Send);
    assert_eq!(err.sent, Some(49));

    let report = consumer_handle.await.unwrap().unwrap();
    assert_eq!(report.messages, 49);
    assert!(report.messages < 100);
    assert!(!report.completed);
}
