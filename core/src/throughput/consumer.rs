//! Open-loop consumer driver

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::ThroughputConfig;
use crate::context::drain;
use crate::error::{BenchError, BenchResult};
use crate::traits::{Role, StreamBenchmark};

use super::report::{DriverState, ThroughputReport};

/// Counts received messages until the configured total arrives
///
/// The clock starts at the first receipt, so time spent waiting for the
/// producer to begin is not measured.
pub struct Consumer {
    benchmark: Box<dyn StreamBenchmark>,
    config: ThroughputConfig,
    state: DriverState,
}

enum Next {
    Message,
    Closed,
    TimedOut,
}

impl Consumer {
    /// Create a consumer over a not yet connected backend
    pub fn new(benchmark: Box<dyn StreamBenchmark>, config: ThroughputConfig) -> Self {
        Self {
            benchmark,
            config,
            state: DriverState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Connect and subscribe without receiving yet
    ///
    /// Lets a producer start only once the subscription exists. [`run`]
    /// calls this itself when needed.
    ///
    /// [`run`]: Consumer::run
    pub async fn subscribe(&mut self) -> BenchResult<mpsc::Receiver<Vec<u8>>> {
        self.config.validate()?;
        self.benchmark
            .setup(Role::Consumer, self.config.message_count)
            .await
            .map_err(|e| BenchError::backend_setup(format!("consumer: {e}")))?;
        self.benchmark.take_receiver().ok_or_else(|| {
            BenchError::backend_setup("consumer: backend provided no receive channel")
        })
    }

    /// Subscribe and receive until the configured count is observed
    ///
    /// An idle timeout or a closed channel ends the run early with a partial
    /// report rather than an error.
    pub async fn run(&mut self) -> BenchResult<ThroughputReport> {
        let receiver = self.subscribe().await?;
        self.run_subscribed(receiver).await
    }

    /// Receive on a channel obtained from [`subscribe`](Consumer::subscribe)
    pub async fn run_subscribed(
        &mut self,
        mut receiver: mpsc::Receiver<Vec<u8>>,
    ) -> BenchResult<ThroughputReport> {
        let count = self.config.message_count;
        tracing::info!(
            backend = self.benchmark.name(),
            messages = count,
            "Consumer started"
        );

        self.state = DriverState::Receiving;
        let mut received = 0u64;
        let mut first: Option<Instant> = None;
        let mut last: Option<Instant> = None;

        while received < count {
            match next_message(&mut receiver, self.config.recv_timeout).await {
                Next::Message => {
                    let now = Instant::now();
                    first.get_or_insert(now);
                    last = Some(now);
                    received += 1;
                }
                Next::Closed => {
                    tracing::warn!(received, expected = count, "Receive channel closed early");
                    break;
                }
                Next::TimedOut => {
                    tracing::warn!(
                        received,
                        expected = count,
                        timeout_ms = ?self.config.recv_timeout.map(|t| t.as_millis()),
                        "No message within receive timeout"
                    );
                    break;
                }
            }
        }
        self.state = DriverState::Done;

        let elapsed = match (first, last) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        };

        let report = ThroughputReport {
            role: Role::Consumer,
            messages: received,
            errors: self.benchmark.errors(),
            elapsed,
            completed: received >= count,
            error_policy: self.config.error_policy,
        };

        if report.is_degraded() {
            tracing::warn!(
                messages = report.messages,
                errors = report.errors,
                completed = report.completed,
                "Consumer finished degraded"
            );
        } else {
            tracing::info!(
                messages = report.messages,
                elapsed_secs = elapsed.as_secs_f64(),
                throughput = ?report.throughput(),
                "Consumer finished"
            );
        }

        drain(self.config.drain).await;

        Ok(report)
    }
}

async fn next_message(receiver: &mut mpsc::Receiver<Vec<u8>>, timeout: Option<Duration>) -> Next {
    let received = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(received) => received,
            Err(_) => return Next::TimedOut,
        },
        None => receiver.recv().await,
    };
    match received {
        Some(_) => Next::Message,
        None => Next::Closed,
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("backend", &self.benchmark.name())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}
