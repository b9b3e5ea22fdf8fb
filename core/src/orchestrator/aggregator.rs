//! Result aggregation from multiple workers

use std::time::{Duration, Instant};

use crate::config::ExperimentConfig;
use crate::context::RunContext;
use crate::error::BenchResult;
use crate::metrics::{LatencyHistogram, Summary, DEFAULT_PERCENTILES};
use crate::worker::WorkerStats;

/// Aggregated statistics from all workers
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of workers that completed
    pub total_workers: usize,

    /// Total successful requests
    pub total_completed: u64,

    /// Total failed requests
    pub total_errors: u64,

    /// Merged latencies of successful requests
    pub histogram: LatencyHistogram,

    /// Merged corrected latencies, when any worker tracked them
    pub corrected: Option<LatencyHistogram>,

    /// Maximum duration across all workers
    pub total_duration: Duration,

    /// Latest instant a worker stopped measuring, before its teardown
    pub last_stop: Option<Instant>,
}

impl AggregatedStats {
    /// Get the total number of requests (completed + errors)
    pub fn total_requests(&self) -> u64 {
        self.total_completed + self.total_errors
    }

    /// Get the error rate (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        let total = self.total_requests();
        if total > 0 {
            self.total_errors as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Time from the start of `context` to the last worker stop
    ///
    /// Requester teardown happens after a worker stops and is not part of
    /// the measured window.
    pub fn measured_elapsed(&self, context: &RunContext) -> Duration {
        self.last_stop
            .map(|stop| stop.saturating_duration_since(context.started()))
            .unwrap_or_else(|| context.elapsed())
    }
}

/// Merge the statistics of every worker
///
/// The merge is commutative: the result does not depend on the order in
/// which workers finished.
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> BenchResult<AggregatedStats> {
    let mut merged = WorkerStats::new();
    for worker in stats {
        merged.merge(worker)?;
    }

    // Use the maximum elapsed time across all workers
    let total_duration = stats
        .iter()
        .filter_map(|s| s.elapsed())
        .max()
        .unwrap_or(Duration::ZERO);
    let last_stop = stats.iter().filter_map(|s| s.ended_at).max();

    Ok(AggregatedStats {
        total_workers: stats.len(),
        total_completed: merged.completed,
        total_errors: merged.errors,
        histogram: merged.histogram,
        corrected: merged.corrected,
        total_duration,
        last_stop,
    })
}

/// Turn aggregated worker results into the final run summary
///
/// `elapsed` is measured from the run context, so every worker shares the
/// same origin.
pub fn summarize(
    backend: &str,
    aggregated: AggregatedStats,
    config: &ExperimentConfig,
    context: &RunContext,
    elapsed: Duration,
) -> Summary {
    // Successes are the latency samples themselves, keeping both counts equal
    let successes = aggregated.histogram.len();
    let errors = aggregated.total_errors;
    if successes != aggregated.total_completed {
        tracing::warn!(
            completed = aggregated.total_completed,
            samples = successes,
            "Completed count differs from recorded samples"
        );
    }

    let secs = elapsed.as_secs_f64();
    let throughput = if secs > 0.0 {
        successes as f64 / secs
    } else {
        0.0
    };

    let latency = aggregated.histogram.distribution(&DEFAULT_PERCENTILES);
    let corrected_latency = aggregated
        .corrected
        .as_ref()
        .map(|h| h.distribution(&DEFAULT_PERCENTILES));

    let ended_at = context.started_at()
        + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());

    Summary {
        backend: backend.to_string(),
        connections: config.connections,
        rate_limit: config.effective_rate(),
        started_at: context.started_at(),
        ended_at,
        elapsed,
        total_requests: successes + errors,
        successes,
        errors,
        throughput,
        latency,
        corrected_latency,
        report_granularity: config.report_granularity,
        histogram: aggregated.histogram,
        corrected_histogram: aggregated.corrected,
    }
}
