//! Apache Kafka backend over librdkafka

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot::Canceled;
use futures::stream::{FuturesUnordered, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use log_bench_core::payload::{sequenced_payload, Delivery, SequenceTracker};
use log_bench_core::{RequestError, Requester, RequesterFactory, Role, StreamBenchmark};

use crate::config::BackendConfig;
use crate::memory::SUBSCRIBER_BUFFER;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Deliveries awaited before the producer stops queueing new messages
const MAX_IN_FLIGHT: usize = 100_000;

fn client_config(config: &BackendConfig, client_id: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.url)
        .set("client.id", client_id)
        .set("socket.keepalive.enable", "true");
    client
}

fn connection_error(err: KafkaError) -> RequestError {
    RequestError::Connection(err.to_string())
}

/// Fail fast when the cluster is unreachable
async fn fetch_metadata(producer: FutureProducer, topic: String) -> Result<(), RequestError> {
    tokio::task::spawn_blocking(move || {
        producer
            .client()
            .fetch_metadata(Some(&topic), Timeout::After(METADATA_TIMEOUT))
            .map(|_| ())
            .map_err(connection_error)
    })
    .await
    .map_err(|e| RequestError::Other(e.to_string()))?
}

/// High watermark of partition 0: the offset the next produced message gets
async fn fetch_high_watermark(
    producer: FutureProducer,
    topic: String,
) -> Result<i64, RequestError> {
    tokio::task::spawn_blocking(move || {
        producer
            .client()
            .fetch_watermarks(&topic, 0, Timeout::After(METADATA_TIMEOUT))
            .map(|(_low, high)| high)
            .map_err(connection_error)
    })
    .await
    .map_err(|e| RequestError::Other(e.to_string()))?
}

/// Partition 0 of `topic`, starting at the concrete offset `high`
fn tail_assignment(topic: &str, high: i64) -> Result<TopicPartitionList, RequestError> {
    let mut partitions = TopicPartitionList::new();
    partitions
        .add_partition_offset(topic, 0, Offset::Offset(high))
        .map_err(connection_error)?;
    Ok(partitions)
}

async fn flush(producer: FutureProducer) -> Result<(), RequestError> {
    tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
        .await
        .map_err(|e| RequestError::Other(e.to_string()))?
        .map_err(|e| {
            tracing::warn!(error = %e, "Kafka flush did not complete");
            RequestError::Timeout(FLUSH_TIMEOUT)
        })
}

// ============================================================================
// Latency requester
// ============================================================================

/// Round-trip requester: produce to a private topic, consume the same record
pub struct KafkaRequester {
    config: BackendConfig,
    topic: String,
    client_id: String,
    producer: Option<FutureProducer>,
    consumer: Option<StreamConsumer>,
}

impl KafkaRequester {
    fn new(config: BackendConfig, topic: String, client_id: String) -> Self {
        Self {
            config,
            topic,
            client_id,
            producer: None,
            consumer: None,
        }
    }
}

#[async_trait]
impl Requester for KafkaRequester {
    async fn setup(&mut self) -> Result<(), RequestError> {
        let producer: FutureProducer = client_config(&self.config, &self.client_id)
            .set("acks", "1")
            .set("linger.ms", "0")
            .create()
            .map_err(connection_error)?;
        fetch_metadata(producer.clone(), self.topic.clone()).await?;

        let consumer: StreamConsumer = client_config(&self.config, &self.client_id)
            .set("group.id", &self.client_id)
            .set("enable.auto.commit", "false")
            .set("fetch.wait.max.ms", "1")
            .create()
            .map_err(connection_error)?;

        // Offset::End resolves lazily, after the first produce may land
        let high = fetch_high_watermark(producer.clone(), self.topic.clone()).await?;
        consumer
            .assign(&tail_assignment(&self.topic, high)?)
            .map_err(connection_error)?;
        tracing::debug!(topic = %self.topic, offset = high, "Kafka requester assigned");

        self.producer = Some(producer);
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, RequestError> {
        let (Some(producer), Some(consumer)) = (self.producer.as_ref(), self.consumer.as_ref())
        else {
            return Err(RequestError::Connection("requester is not set up".to_string()));
        };

        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);
        producer
            .send(record, Timeout::After(DELIVERY_TIMEOUT))
            .await
            .map_err(|(e, _)| RequestError::Rejected(e.to_string()))?;

        let message = consumer.recv().await.map_err(connection_error)?;
        Ok(message.payload().map(<[u8]>::to_vec).unwrap_or_default())
    }

    async fn teardown(&mut self) -> Result<(), RequestError> {
        self.consumer = None;
        match self.producer.take() {
            Some(producer) => flush(producer).await,
            None => Ok(()),
        }
    }
}

/// Creates one [`KafkaRequester`] per worker, each on its own topic
#[derive(Debug, Clone)]
pub struct KafkaRequesterFactory {
    config: BackendConfig,
}

impl KafkaRequesterFactory {
    /// Factory for requesters against `config.url`
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl RequesterFactory for KafkaRequesterFactory {
    fn name(&self) -> &str {
        "kafka"
    }

    fn payload_size(&self) -> usize {
        self.config.payload_size
    }

    fn get_requester(&self, worker_index: usize) -> Box<dyn Requester> {
        Box::new(KafkaRequester::new(
            self.config.clone(),
            self.config.requester_topic(worker_index),
            format!("{}-{}", self.config.client_id, worker_index),
        ))
    }
}

// ============================================================================
// Stream benchmark
// ============================================================================

/// Open-loop producer or consumer on a Kafka topic
pub struct KafkaBenchmark {
    config: BackendConfig,
    producer: Option<FutureProducer>,
    pending: FuturesUnordered<DeliveryFuture>,
    next_sequence: u64,
    receiver: Option<mpsc::Receiver<Vec<u8>>>,
    errors: Arc<AtomicU64>,
    forwarder: Option<JoinHandle<()>>,
}

impl KafkaBenchmark {
    /// Benchmark against `config.topic`
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            producer: None,
            pending: FuturesUnordered::new(),
            next_sequence: 0,
            receiver: None,
            errors: Arc::new(AtomicU64::new(0)),
            forwarder: None,
        }
    }

    async fn setup_producer(&mut self) -> Result<(), RequestError> {
        let producer: FutureProducer = client_config(&self.config, &self.config.client_id)
            .set("queue.buffering.max.messages", "10000000")
            .set("queue.buffering.max.kbytes", "1048576")
            .set("linger.ms", "5")
            .create()
            .map_err(connection_error)?;
        fetch_metadata(producer.clone(), self.config.topic.clone()).await?;
        self.producer = Some(producer);
        Ok(())
    }

    fn setup_consumer(&mut self, message_count: u64) -> Result<(), RequestError> {
        let consumer: StreamConsumer = client_config(&self.config, &self.config.client_id)
            .set("group.id", &self.config.client_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(connection_error)?;
        consumer
            .subscribe(&[&self.config.topic])
            .map_err(connection_error)?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let errors = Arc::clone(&self.errors);
        let mut tracker = SequenceTracker::new(self.config.payload_size);

        self.forwarder = Some(tokio::spawn(async move {
            let mut seen = 0u64;
            loop {
                let payload = match consumer.recv().await {
                    Ok(message) => message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    Err(e) => {
                        errors.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(error = %e, "Kafka receive failed");
                        continue;
                    }
                };
                if tracker.observe(&payload) != Delivery::Valid {
                    errors.fetch_add(1, Ordering::Relaxed);
                }
                seen += 1;
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            tracing::debug!(seen, expected = message_count, "Kafka subscription ended");
        }));
        self.receiver = Some(rx);
        Ok(())
    }

    /// Wait for one outstanding delivery; false when none are left
    async fn settle_one(&mut self) -> bool {
        match self.pending.next().await {
            Some(result) => {
                record_delivery(&self.errors, result);
                true
            }
            None => false,
        }
    }
}

/// Count failed or lost deliveries as soft errors
fn record_delivery<T, M>(errors: &AtomicU64, result: Result<Result<T, (KafkaError, M)>, Canceled>) {
    match result {
        Ok(Ok(_)) => {}
        Ok(Err((e, _))) => {
            errors.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, "Kafka delivery failed");
        }
        Err(_) => {
            errors.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Kafka delivery report lost");
        }
    }
}

#[async_trait]
impl StreamBenchmark for KafkaBenchmark {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn setup(&mut self, role: Role, message_count: u64) -> Result<(), RequestError> {
        match role {
            Role::Producer => self.setup_producer().await,
            Role::Consumer => self.setup_consumer(message_count),
        }
    }

    async fn send(&mut self) -> Result<(), RequestError> {
        let producer = self
            .producer
            .clone()
            .ok_or_else(|| RequestError::Connection("producer is not set up".to_string()))?;

        if self.pending.len() >= MAX_IN_FLIGHT {
            self.settle_one().await;
        }

        let topic = self.config.topic.clone();
        let payload = sequenced_payload(self.next_sequence, self.config.payload_size);
        let mut record = FutureRecord::<(), [u8]>::to(&topic).payload(&payload);

        loop {
            match producer.send_result(record) {
                Ok(delivery) => {
                    self.pending.push(delivery);
                    self.next_sequence += 1;
                    return Ok(());
                }
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    record = returned;
                    if !self.settle_one().await {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
                Err((e, _)) => return Err(RequestError::Rejected(e.to_string())),
            }
        }
    }

    async fn send_done(&mut self) -> Result<(), RequestError> {
        while self.settle_one().await {}
        match self.producer.clone() {
            Some(producer) => flush(producer).await,
            None => Ok(()),
        }
    }

    fn take_receiver(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.receiver.take()
    }

    fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for KafkaBenchmark {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
