//! Open-loop throughput drivers
//!
//! A [`Producer`] pushes a fixed number of messages through a
//! [`StreamBenchmark`](crate::traits::StreamBenchmark) as fast as the backend
//! accepts them. A [`Consumer`] counts them on the other side. Neither is rate
//! limited; each yields a [`ThroughputReport`].

mod consumer;
mod producer;
mod report;

pub use consumer::Consumer;
pub use producer::Producer;
pub use report::{DriverState, ThroughputReport};

#[cfg(test)]
mod tests;
