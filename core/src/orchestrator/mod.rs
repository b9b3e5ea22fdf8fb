//! Orchestrator for closed-loop experiment lifecycle management
//!
//! The Orchestrator coordinates a complete latency benchmark:
//! - Connecting one requester per connection before measurement starts
//! - Spawning one worker task per connection with a shared rate limiter
//! - Stopping workers at the request count, the deadline, or on Ctrl+C
//! - Merging per-worker histograms into a [`Summary`](crate::Summary)
//!
//! # Example
//!
//! ```ignore
//! use log_bench_core::{OrchestratorBuilder, StopCondition};
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .connections(4)
//!     .stop_condition(StopCondition::Duration(Duration::from_secs(15)))
//!     .rate_limit(Some(5000.0))
//!     .factory(factory)
//!     .build()?;
//!
//! let summary = orchestrator.run_with_signal_handling().await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_worker_stats, summarize, AggregatedStats};
pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
