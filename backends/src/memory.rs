//! In-process broker
//!
//! A topic-based pub/sub broker living in the benchmark process. It exercises
//! the whole harness without external infrastructure: publishes fan out to
//! every subscriber of a topic over bounded channels, so a slow subscriber
//! applies backpressure to the publisher like a real broker would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use log_bench_core::payload::{sequenced_payload, Delivery, SequenceTracker};
use log_bench_core::{RequestError, Requester, RequesterFactory, Role, StreamBenchmark};

use crate::config::BackendConfig;

/// Per-subscriber channel capacity
pub const SUBSCRIBER_BUFFER: usize = 1024;

type Subscribers = HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>;

#[derive(Default)]
struct BrokerInner {
    topics: Mutex<Subscribers>,
    latency: Option<Duration>,
    closed: AtomicBool,
    published: AtomicU64,
}

/// Shared handle to an in-process broker
///
/// Cloning is cheap; all clones talk to the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker that delays every publish by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                latency: Some(latency),
                ..BrokerInner::default()
            }),
        }
    }

    fn topics(&self) -> MutexGuard<'_, Subscribers> {
        // Subscriber lists stay consistent even if a holder panicked
        self.inner
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), RequestError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RequestError::Closed("broker is shut down".to_string()));
        }
        Ok(())
    }

    /// Check that the broker accepts connections
    pub fn connect(&self) -> Result<(), RequestError> {
        self.ensure_open()
    }

    /// Subscribe to `topic`, receiving every message published after this call
    pub fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, RequestError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.topics().entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }

    /// Publish to every live subscriber of `topic`
    ///
    /// Waits while a subscriber's buffer is full. Returns the number of
    /// subscribers the message reached; zero is not an error.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<usize, RequestError> {
        self.ensure_open()?;
        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency).await;
        }

        let subscribers: Vec<_> = self
            .topics()
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for tx in subscribers {
            if tx.send(payload.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        self.prune(topic);
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        Ok(delivered)
    }

    fn prune(&self, topic: &str) {
        let mut topics = self.topics();
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|tx| !tx.is_closed());
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Number of live subscribers on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics()
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Messages accepted by the broker so far
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Shut the broker down
    ///
    /// Further connects and publishes fail, and every subscription channel
    /// closes once drained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.topics().clear();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.topics().len())
            .field("latency", &self.inner.latency)
            .field("closed", &self.is_closed())
            .field("published", &self.published())
            .finish()
    }
}

// ============================================================================
// Latency requester
// ============================================================================

/// Round-trip requester: publish on its own topic, wait for the echo
pub struct MemoryRequester {
    broker: MemoryBroker,
    topic: String,
    replies: Option<mpsc::Receiver<Vec<u8>>>,
}

impl MemoryRequester {
    /// Requester talking on `topic`
    pub fn new(broker: MemoryBroker, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            replies: None,
        }
    }
}

#[async_trait]
impl Requester for MemoryRequester {
    async fn setup(&mut self) -> Result<(), RequestError> {
        self.broker.connect()?;
        self.replies = Some(self.broker.subscribe(&self.topic)?);
        Ok(())
    }

    async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, RequestError> {
        let replies = self
            .replies
            .as_mut()
            .ok_or_else(|| RequestError::Connection("requester is not set up".to_string()))?;

        self.broker.publish(&self.topic, payload.to_vec()).await?;
        let reply = replies
            .recv()
            .await
            .ok_or_else(|| RequestError::Closed("subscription closed".to_string()))?;

        if reply.len() != payload.len() {
            return Err(RequestError::Other(format!(
                "reply of {} bytes for a {} byte request",
                reply.len(),
                payload.len()
            )));
        }
        Ok(reply)
    }

    async fn teardown(&mut self) -> Result<(), RequestError> {
        self.replies = None;
        Ok(())
    }
}

/// Creates one [`MemoryRequester`] per worker on a shared broker
#[derive(Debug, Clone)]
pub struct MemoryRequesterFactory {
    broker: MemoryBroker,
    config: BackendConfig,
}

impl MemoryRequesterFactory {
    /// Factory for requesters on `broker`
    pub fn new(broker: MemoryBroker, config: BackendConfig) -> Self {
        Self { broker, config }
    }
}

impl RequesterFactory for MemoryRequesterFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn payload_size(&self) -> usize {
        self.config.payload_size
    }

    fn get_requester(&self, worker_index: usize) -> Box<dyn Requester> {
        Box::new(MemoryRequester::new(
            self.broker.clone(),
            self.config.requester_topic(worker_index),
        ))
    }
}

// ============================================================================
// Stream benchmark
// ============================================================================

/// Open-loop producer or consumer on the in-process broker
pub struct MemoryBenchmark {
    broker: MemoryBroker,
    topic: String,
    payload_size: usize,
    next_sequence: u64,
    receiver: Option<mpsc::Receiver<Vec<u8>>>,
    errors: Arc<AtomicU64>,
    forwarder: Option<JoinHandle<()>>,
}

impl MemoryBenchmark {
    /// Benchmark publishing to, or subscribing to, `config.topic`
    pub fn new(broker: MemoryBroker, config: &BackendConfig) -> Self {
        Self {
            broker,
            topic: config.topic.clone(),
            payload_size: config.payload_size,
            next_sequence: 0,
            receiver: None,
            errors: Arc::new(AtomicU64::new(0)),
            forwarder: None,
        }
    }
}

#[async_trait]
impl StreamBenchmark for MemoryBenchmark {
    fn name(&self) -> &str {
        "memory"
    }

    async fn setup(&mut self, role: Role, message_count: u64) -> Result<(), RequestError> {
        self.broker.connect()?;
        if role == Role::Producer {
            return Ok(());
        }

        let mut raw = self.broker.subscribe(&self.topic)?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let errors = Arc::clone(&self.errors);
        let mut tracker = SequenceTracker::new(self.payload_size);

        self.forwarder = Some(tokio::spawn(async move {
            let mut seen = 0u64;
            while let Some(payload) = raw.recv().await {
                if tracker.observe(&payload) != Delivery::Valid {
                    errors.fetch_add(1, Ordering::Relaxed);
                }
                seen += 1;
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            tracing::debug!(seen, expected = message_count, "Memory subscription ended");
        }));
        self.receiver = Some(rx);
        Ok(())
    }

    async fn send(&mut self) -> Result<(), RequestError> {
        let payload = sequenced_payload(self.next_sequence, self.payload_size);
        self.broker.publish(&self.topic, payload).await?;
        self.next_sequence += 1;
        Ok(())
    }

    async fn send_done(&mut self) -> Result<(), RequestError> {
        // Publishes complete synchronously with delivery
        Ok(())
    }

    fn take_receiver(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.receiver.take()
    }

    fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for MemoryBenchmark {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
