//! Closed-loop worker pool members
//!
//! Each Worker owns one connected requester and runs the loop
//! **wait for permit -> request -> record -> repeat**:
//!
//! 1. Check the shutdown signal, the deadline and the shared request count
//! 2. Wait for a permit from the aggregate rate limiter
//! 3. Issue one request and time it
//! 4. Record the latency into the worker's own histogram, or count an error
//!
//! A worker never has more than one request outstanding, so the number of
//! connections bounds concurrency.
//!
//! # Example
//!
//! ```ignore
//! use log_bench_core::worker::{WorkerBuilder, RequestRateLimiter};
//! use log_bench_core::traits::StopCondition;
//!
//! let worker = WorkerBuilder::new(0)
//!     .requester(requester)
//!     .payload(payload)
//!     .rate_limiter(Arc::new(RequestRateLimiter::new(Some(5000.0))))
//!     .stop_condition(StopCondition::RequestCount(100))
//!     .context(ctx)
//!     .build()?;
//!
//! let stats = worker.run(shutdown_rx).await?;
//! println!("Completed: {}", stats.completed);
//! ```

mod builder;
mod executor;
mod rate_limiter;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::Worker;
pub use rate_limiter::RequestRateLimiter;
pub use stats::WorkerStats;

#[cfg(test)]
mod tests;
