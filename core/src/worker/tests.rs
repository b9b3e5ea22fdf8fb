//! Integration tests for the Worker module

use super::*;
use crate::context::RunContext;
use crate::traits::{RequestError, Requester, StopCondition};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

// ============================================================================
// Mock Requester
// ============================================================================

struct MockRequester {
    delay: Option<Duration>,
    fail_every: Option<usize>,
    requests: Arc<AtomicUsize>,
    torn_down: Arc<AtomicBool>,
}

impl MockRequester {
    fn new() -> Self {
        Self {
            delay: None,
            fail_every: None,
            requests: Arc::new(AtomicUsize::new(0)),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }
}

#[async_trait]
impl Requester for MockRequester {
    async fn setup(&mut self) -> Result<(), RequestError> {
        Ok(())
    }

    async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, RequestError> {
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fail_every) = self.fail_every {
            if count.is_multiple_of(fail_every) {
                return Err(RequestError::Rejected("simulated failure".to_string()));
            }
        }

        Ok(payload.to_vec())
    }

    async fn teardown(&mut self) -> Result<(), RequestError> {
        self.torn_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn create_test_worker(
    requester: MockRequester,
    stop_condition: StopCondition,
    rate_limit: Option<f64>,
) -> (Worker, broadcast::Sender<()>) {
    let (shutdown_tx, _) = broadcast::channel(1);

    let worker = WorkerBuilder::new(0)
        .requester(Box::new(requester))
        .payload(Arc::from(vec![7u8; 64]))
        .rate_limiter(Arc::new(RequestRateLimiter::new(rate_limit)))
        .context(RunContext::start(&stop_condition))
        .stop_condition(stop_condition)
        .build()
        .expect("Failed to build worker");

    (worker, shutdown_tx)
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_worker_run_request_count() {
    let requester = MockRequester::new();
    let requests = requester.requests.clone();
    let torn_down = requester.torn_down.clone();

    let (worker, shutdown_tx) = create_test_worker(requester, StopCondition::RequestCount(5), None);

    let stats = worker
        .run(shutdown_tx.subscribe())
        .await
        .expect("Worker failed");

    assert_eq!(stats.completed, 5);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.histogram.len(), 5);
    assert_eq!(requests.load(Ordering::SeqCst), 5);
    assert!(torn_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_worker_run_shutdown() {
    let requester = MockRequester::new().with_delay(Duration::from_millis(20));
    let torn_down = requester.torn_down.clone();

    let (worker, shutdown_tx) = create_test_worker(requester, StopCondition::Indefinite, None);
    let shutdown_rx = shutdown_tx.subscribe();

    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).expect("Failed to send shutdown");

    let stats = handle
        .await
        .expect("Worker task panicked")
        .expect("Worker failed");

    assert!(stats.completed >= 1);
    assert!(torn_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_worker_shutdown_interrupts_permit_wait() {
    // One permit every 10s: the second request would block for a long time
    let (worker, shutdown_tx) =
        create_test_worker(MockRequester::new(), StopCondition::Indefinite, Some(0.1));
    let shutdown_rx = shutdown_tx.subscribe();

    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    shutdown_tx.send(()).expect("Failed to send shutdown");
    let stats = handle.await.unwrap().unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_worker_run_with_errors() {
    let requester = MockRequester::new().with_fail_every(2);

    let (worker, shutdown_tx) = create_test_worker(requester, StopCondition::RequestCount(5), None);
    let stats = worker
        .run(shutdown_tx.subscribe())
        .await
        .expect("Worker failed");

    // Requests 2 and 4 fail
    assert_eq!(stats.total_requests(), 5);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.histogram.len(), 3);
}

#[tokio::test]
async fn test_worker_run_duration() {
    let requester = MockRequester::new().with_delay(Duration::from_millis(20));

    let (worker, shutdown_tx) = create_test_worker(
        requester,
        StopCondition::Duration(Duration::from_millis(100)),
        None,
    );

    let start = Instant::now();
    let stats = worker
        .run(shutdown_tx.subscribe())
        .await
        .expect("Worker failed");
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(300));
    assert!(stats.completed >= 3);
}

#[tokio::test]
async fn test_worker_with_rate_limit() {
    let (worker, shutdown_tx) = create_test_worker(
        MockRequester::new(),
        StopCondition::RequestCount(6),
        Some(100.0),
    );

    let start = Instant::now();
    let stats = worker
        .run(shutdown_tx.subscribe())
        .await
        .expect("Worker failed");

    assert_eq!(stats.completed, 6);
    // Five gaps of 10ms after the first permit
    assert!(start.elapsed() >= Duration::from_millis(45));
}

#[tokio::test]
async fn test_worker_records_corrected_latency_when_paced() {
    let stop = StopCondition::RequestCount(3);
    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = WorkerBuilder::new(1)
        .requester(Box::new(MockRequester::new()))
        .payload(Arc::from(vec![0u8; 8]))
        .rate_limiter(Arc::new(RequestRateLimiter::new(Some(1000.0))))
        .context(RunContext::start(&stop))
        .stop_condition(stop)
        .expected_interval(Some(Duration::from_millis(1)))
        .build()
        .unwrap();

    let stats = worker.run(shutdown_tx.subscribe()).await.unwrap();
    assert_eq!(stats.completed, 3);
    assert!(stats.corrected.is_some());
    assert!(stats.corrected.unwrap().len() >= 3);
}

#[tokio::test]
async fn test_workers_share_request_counter() {
    let stop = StopCondition::RequestCount(10);
    let ctx = RunContext::start(&stop);
    let counter = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, _) = broadcast::channel(1);

    let handles: Vec<_> = (0..3)
        .map(|id| {
            let worker = WorkerBuilder::new(id)
                .requester(Box::new(
                    MockRequester::new().with_delay(Duration::from_millis(2)),
                ))
                .payload(Arc::from(vec![0u8; 8]))
                .context(ctx)
                .stop_condition(stop.clone())
                .request_counter(counter.clone())
                .build()
                .unwrap();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move { worker.run(shutdown_rx).await })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().unwrap().total_requests();
    }

    assert_eq!(total, 10);
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_limiter_starves_no_worker() {
    let stop = StopCondition::Duration(Duration::from_secs(1));
    let ctx = RunContext::start(&stop);
    let limiter = Arc::new(RequestRateLimiter::new(Some(200.0)));
    let (shutdown_tx, _) = broadcast::channel(1);

    let handles: Vec<_> = (0..4)
        .map(|id| {
            let worker = WorkerBuilder::new(id)
                .requester(Box::new(
                    MockRequester::new().with_delay(Duration::from_millis(2)),
                ))
                .payload(Arc::from(vec![0u8; 8]))
                .rate_limiter(Arc::clone(&limiter))
                .context(ctx)
                .stop_condition(stop.clone())
                .build()
                .unwrap();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move { worker.run(shutdown_rx).await })
        })
        .collect();

    let mut per_worker = Vec::new();
    for handle in handles {
        per_worker.push(handle.await.unwrap().unwrap().completed);
    }

    // Fair share is 50 each; every worker gets at least half of it
    let total: u64 = per_worker.iter().sum();
    assert!(total <= 201, "limiter overshot: {per_worker:?}");
    assert!(
        per_worker.iter().all(|&completed| completed >= 25),
        "a worker was starved: {per_worker:?}"
    );
}
