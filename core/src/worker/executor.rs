//! Worker execution loop

use crate::context::RunContext;
use crate::error::BenchResult;
use crate::traits::{Requester, StopCondition};

use super::rate_limiter::RequestRateLimiter;
use super::stats::WorkerStats;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Worker drives one connected requester: wait for a permit -> request -> record
///
/// The requester must already be set up; the worker tears it down when its
/// loop ends. Latencies go into the worker's own histogram, so nothing is
/// shared on the hot path except the rate limiter and the request counter.
pub struct Worker {
    /// Unique worker identifier
    id: usize,

    /// Connected requester, owned exclusively by this worker
    requester: Box<dyn Requester>,

    /// Payload sent with every request
    payload: Arc<[u8]>,

    /// Aggregate rate limiter shared by all workers
    rate_limiter: Arc<RequestRateLimiter>,

    /// Stop condition
    stop_condition: StopCondition,

    /// Run start and deadline
    context: RunContext,

    /// Shared request counter for count-bounded runs
    request_counter: Option<Arc<AtomicUsize>>,

    /// Total requests (when using counter-based distribution)
    total_requests: Option<usize>,

    /// Per-worker request interval at the target rate
    expected_interval: Option<Duration>,
}

impl Worker {
    /// Create a new worker around a set-up requester
    pub fn new(
        id: usize,
        requester: Box<dyn Requester>,
        payload: Arc<[u8]>,
        rate_limiter: Arc<RequestRateLimiter>,
        stop_condition: StopCondition,
        context: RunContext,
    ) -> Self {
        Self {
            id,
            requester,
            payload,
            rate_limiter,
            stop_condition,
            context,
            request_counter: None,
            total_requests: None,
            expected_interval: None,
        }
    }

    /// Share a request counter so exactly `total_requests` are issued overall
    pub fn with_request_counter(
        mut self,
        counter: Arc<AtomicUsize>,
        total_requests: usize,
    ) -> Self {
        self.request_counter = Some(counter);
        self.total_requests = Some(total_requests);
        self
    }

    /// Also record coordinated-omission corrected latencies
    pub fn with_expected_interval(mut self, interval: Option<Duration>) -> Self {
        self.expected_interval = interval;
        self
    }

    /// Run the worker loop
    ///
    /// Returns the worker's stats once the stop condition is met or shutdown
    /// is signalled. A request already in flight when shutdown arrives is
    /// allowed to finish and is recorded.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> BenchResult<WorkerStats> {
        let mut stats = if self.expected_interval.is_some() {
            WorkerStats::with_correction()
        } else {
            WorkerStats::new()
        };
        stats.start();

        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            if shutdown_requested(&mut shutdown) {
                tracing::debug!(worker_id = self.id, "Shutdown signal received");
                break;
            }

            if self.should_stop() {
                tracing::debug!(
                    worker_id = self.id,
                    completed = stats.completed,
                    errors = stats.errors,
                    "Run deadline reached"
                );
                break;
            }

            if !self.try_claim_request() {
                tracing::debug!(worker_id = self.id, "Request budget exhausted");
                break;
            }

            let permitted = tokio::select! {
                biased;

                _ = shutdown.recv() => false,
                _ = self.rate_limiter.wait() => true,
            };

            // The deadline may pass while waiting for a permit
            if !permitted || self.should_stop() {
                self.release_claim();
                break;
            }

            let start = Instant::now();
            match self.requester.request(&self.payload).await {
                Ok(_) => stats.record_success(start.elapsed(), self.expected_interval),
                Err(e) => {
                    stats.record_error();
                    tracing::debug!(worker_id = self.id, error = %e, "Request failed");
                }
            }
        }

        stats.stop();

        if let Err(e) = self.requester.teardown().await {
            tracing::warn!(worker_id = self.id, error = %e, "Requester teardown failed");
        }

        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            errors = stats.errors,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        Ok(stats)
    }

    /// Try to claim a request slot from the shared counter
    ///
    /// Always succeeds when the run is not count-bounded.
    fn try_claim_request(&self) -> bool {
        if let (Some(counter), Some(total)) = (&self.request_counter, self.total_requests) {
            let claimed = counter.fetch_add(1, Ordering::SeqCst);
            if claimed >= total {
                // Over-claimed near the limit, give the slot back
                counter.fetch_sub(1, Ordering::SeqCst);
                return false;
            }
        }
        true
    }

    fn release_claim(&self) {
        if let Some(counter) = &self.request_counter {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Duration-bounded runs stop at the shared deadline
    fn should_stop(&self) -> bool {
        match self.stop_condition {
            StopCondition::Duration(_) => self.context.is_expired(),
            StopCondition::RequestCount(_) | StopCondition::Indefinite => false,
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .field("rate_limiter", &self.rate_limiter)
            .field("stop_condition", &self.stop_condition)
            .field("expected_interval", &self.expected_interval)
            .finish()
    }
}
