//! log-bench-core: load generation and measurement engine for message backends
//!
//! This crate drives a backend at a controlled rate, or as fast as it goes,
//! and measures what happens:
//!
//! - Closed loop: a pool of workers, one connection each, paced by a shared
//!   rate limiter. Every request's latency lands in a per-worker histogram,
//!   merged into a [`Summary`] at the end.
//! - Open loop: a [`Producer`] and a [`Consumer`] measuring raw send and
//!   receive throughput.
//!
//! Backends plug in through the [`Requester`], [`RequesterFactory`] and
//! [`StreamBenchmark`] traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod payload;
pub mod throughput;
pub mod traits;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

pub use config::{ConfigError, ErrorPolicy, ExperimentConfig, ThroughputConfig};
pub use context::RunContext;
pub use error::{BenchError, BenchErrorKind, BenchResult};
pub use metrics::{LatencyDistribution, LatencyHistogram, PercentileValue, QuantileTick, Summary};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use throughput::{Consumer, DriverState, Producer, ThroughputReport};
pub use traits::{RequestError, Requester, RequesterFactory, Role, StopCondition, StreamBenchmark};
pub use worker::{RequestRateLimiter, Worker, WorkerBuilder, WorkerStats};

/// Run a duration-bounded closed-loop benchmark
///
/// `rate` is the aggregate requests per second across all `connections`;
/// zero means unlimited. `report_granularity` is carried into the summary for
/// detailed distribution reports.
pub async fn run_latency_benchmark(
    factory: Arc<dyn RequesterFactory>,
    rate: f64,
    connections: usize,
    duration: Duration,
    report_granularity: u32,
) -> BenchResult<Summary> {
    OrchestratorBuilder::new()
        .factory(factory)
        .rate_limit(Some(rate))
        .connections(connections)
        .stop_condition(StopCondition::Duration(duration))
        .report_granularity(report_granularity)
        .build()?
        .run()
        .await
}
