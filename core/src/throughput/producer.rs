//! Open-loop producer driver

use std::time::Instant;

use crate::config::ThroughputConfig;
use crate::context::drain;
use crate::error::{BenchError, BenchResult};
use crate::traits::{Role, StreamBenchmark};

use super::report::{DriverState, ThroughputReport};

/// Sends a fixed number of messages as fast as the backend accepts them
pub struct Producer {
    benchmark: Box<dyn StreamBenchmark>,
    config: ThroughputConfig,
    state: DriverState,
    sent: u64,
}

impl Producer {
    /// Create a producer over a not yet connected backend
    pub fn new(benchmark: Box<dyn StreamBenchmark>, config: ThroughputConfig) -> Self {
        Self {
            benchmark,
            config,
            state: DriverState::Idle,
            sent: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Messages sent successfully so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Send every message, then wait for the backend to flush
    ///
    /// # Errors
    /// A setup failure, or the first failed `send`, which reports how many
    /// messages were sent before it.
    pub async fn run(&mut self) -> BenchResult<ThroughputReport> {
        self.config.validate()?;
        let count = self.config.message_count;

        self.benchmark
            .setup(Role::Producer, count)
            .await
            .map_err(|e| BenchError::backend_setup(format!("producer: {e}")))?;

        tracing::info!(
            backend = self.benchmark.name(),
            messages = count,
            "Producer started"
        );

        self.state = DriverState::Sending;
        let start = Instant::now();

        while self.sent < count {
            if let Err(e) = self.benchmark.send().await {
                self.state = DriverState::Done;
                tracing::error!(sent = self.sent, error = %e, "Send failed, aborting producer");
                return Err(BenchError::send(self.sent, e));
            }
            self.sent += 1;
        }

        let flushed = self.benchmark.send_done().await;
        let elapsed = start.elapsed();
        self.state = DriverState::Done;
        if let Err(e) = flushed {
            tracing::error!(sent = self.sent, error = %e, "Delivery flush failed");
            return Err(BenchError::send(self.sent, e));
        }

        let report = ThroughputReport {
            role: Role::Producer,
            messages: self.sent,
            errors: self.benchmark.errors(),
            elapsed,
            completed: true,
            error_policy: self.config.error_policy,
        };

        tracing::info!(
            messages = report.messages,
            errors = report.errors,
            elapsed_secs = elapsed.as_secs_f64(),
            throughput = ?report.throughput(),
            "Producer finished"
        );

        drain(self.config.drain).await;

        Ok(report)
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("backend", &self.benchmark.name())
            .field("config", &self.config)
            .field("state", &self.state)
            .field("sent", &self.sent)
            .finish()
    }
}
