//! Orchestrator execution logic

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;

use crate::config::ExperimentConfig;
use crate::context::{drain, RunContext};
use crate::error::{BenchError, BenchResult};
use crate::metrics::Summary;
use crate::traits::{Requester, RequesterFactory, StopCondition};
use crate::worker::{RequestRateLimiter, WorkerBuilder, WorkerStats};

use super::aggregator::{aggregate_worker_stats, summarize};

/// Orchestrator manages the closed-loop experiment lifecycle
///
/// Connects every requester, spawns one worker per connection, stops them at
/// the configured condition and folds their stats into a [`Summary`].
pub struct Orchestrator {
    /// Experiment configuration
    pub(crate) config: ExperimentConfig,

    /// Creates one requester per worker
    pub(crate) factory: Arc<dyn RequesterFactory>,

    /// Shutdown signal sender
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(config: ExperimentConfig, factory: Arc<dyn RequesterFactory>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            factory,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown of all workers
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get the experiment configuration
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run the experiment
    ///
    /// Every requester is set up before any worker starts; a single setup
    /// failure aborts the run before a request is issued.
    pub async fn run(&self) -> BenchResult<Summary> {
        let connections = self.config.connections;

        tracing::info!(
            backend = self.factory.name(),
            connections,
            stop_condition = ?self.config.stop_condition,
            rate_limit = ?self.config.effective_rate(),
            payload_size = self.factory.payload_size(),
            "Starting latency run"
        );

        // Subscribe first so a shutdown during setup is not lost
        let receivers: Vec<_> = (0..connections)
            .map(|_| self.shutdown_tx.subscribe())
            .collect();

        let requesters = self.setup_requesters().await?;
        tracing::debug!(connections, "All requesters connected");

        let payload: Arc<[u8]> = Arc::from(self.factory.payload());
        let request_counter = Arc::new(AtomicUsize::new(0));
        let expected_interval = self.config.expected_interval();

        let context = RunContext::start(&self.config.stop_condition);
        let rate_limiter = Arc::new(RequestRateLimiter::new(self.config.effective_rate()));

        let mut handles = Vec::with_capacity(connections);
        for ((worker_id, requester), shutdown_rx) in
            requesters.into_iter().enumerate().zip(receivers)
        {
            let worker = WorkerBuilder::new(worker_id)
                .requester(requester)
                .payload(Arc::clone(&payload))
                .rate_limiter(Arc::clone(&rate_limiter))
                .stop_condition(self.config.stop_condition.clone())
                .context(context)
                .request_counter(Arc::clone(&request_counter))
                .expected_interval(expected_interval)
                .build()?;

            handles.push(tokio::spawn(async move { worker.run(shutdown_rx).await }));
        }

        let timer = self.spawn_stop_timer();

        let results = collect_worker_stats(handles).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        let results = results?;

        let aggregated = aggregate_worker_stats(&results)?;
        let elapsed = aggregated.measured_elapsed(&context);
        let summary = summarize(
            self.factory.name(),
            aggregated,
            &self.config,
            &context,
            elapsed,
        );

        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            total_requests = summary.total_requests,
            errors = summary.errors,
            throughput = summary.throughput,
            "Latency run finished"
        );

        drain(self.config.drain).await;

        Ok(summary)
    }

    /// Create and connect every requester concurrently
    ///
    /// On failure the requesters that did connect are torn down before the
    /// error is returned.
    async fn setup_requesters(&self) -> BenchResult<Vec<Box<dyn Requester>>> {
        let attempts = (0..self.config.connections).map(|worker_id| {
            let mut requester = self.factory.get_requester(worker_id);
            async move {
                let result = requester.setup().await;
                (worker_id, requester, result)
            }
        });

        let mut connected = Vec::with_capacity(self.config.connections);
        let mut failure = None;
        for (worker_id, requester, result) in join_all(attempts).await {
            match result {
                Ok(()) => connected.push(requester),
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Requester setup failed");
                    failure.get_or_insert(BenchError::setup(worker_id, e));
                }
            }
        }

        let Some(err) = failure else {
            return Ok(connected);
        };

        join_all(connected.iter_mut().map(|r| r.teardown())).await;
        Err(err)
    }

    /// Signal shutdown once a duration-bounded run reaches its end
    fn spawn_stop_timer(&self) -> Option<tokio::task::JoinHandle<()>> {
        let StopCondition::Duration(duration) = self.config.stop_condition else {
            return None;
        };
        let shutdown_tx = self.shutdown_tx.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tracing::debug!("Run duration reached, stopping workers");
            let _ = shutdown_tx.send(());
        }))
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Automatically triggers graceful shutdown on Ctrl+C.
    pub async fn run_with_signal_handling(&self) -> BenchResult<Summary> {
        let shutdown_tx = self.shutdown_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl+C received, stopping workers");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;
        signal_handle.abort();

        result
    }

    /// Run with a timeout
    ///
    /// Automatically triggers shutdown when timeout is reached.
    pub async fn run_with_timeout(&self, timeout: Duration) -> BenchResult<Summary> {
        let shutdown_tx = self.shutdown_tx.clone();

        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::info!("Run timeout reached, stopping workers");
            let _ = shutdown_tx.send(());
        });

        let result = self.run().await;
        timeout_handle.abort();

        result
    }
}

/// Wait for every worker task and keep the stats of those that finished
async fn collect_worker_stats(
    handles: Vec<tokio::task::JoinHandle<BenchResult<WorkerStats>>>,
) -> BenchResult<Vec<WorkerStats>> {
    let mut results = Vec::with_capacity(handles.len());
    let mut worker_failures = 0;
    for (idx, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(stats)) => {
                tracing::debug!(
                    worker_id = idx,
                    completed = stats.completed,
                    errors = stats.errors,
                    "Worker completed"
                );
                results.push(stats);
            }
            Ok(Err(e)) => {
                worker_failures += 1;
                tracing::error!(worker_id = idx, error = %e, "Worker failed");
            }
            Err(e) => {
                worker_failures += 1;
                tracing::error!(worker_id = idx, error = %e, "Worker task panicked");
            }
        }
    }

    if results.is_empty() && worker_failures > 0 {
        return Err(BenchError::orchestration(format!(
            "All {worker_failures} workers failed to complete"
        )));
    }

    Ok(results)
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("backend", &self.factory.name())
            .finish()
    }
}
