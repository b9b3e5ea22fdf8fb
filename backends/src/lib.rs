//! log-bench-backends: message backend adapters for log-bench
//!
//! Every backend implements the closed-loop [`Requester`] contract (publish a
//! payload, wait for it to come back) and the open-loop [`StreamBenchmark`]
//! contract (produce or consume a fixed number of messages).
//!
//! | Backend  | Feature  | Notes                                  |
//! |----------|----------|----------------------------------------|
//! | `memory` | always   | in-process broker, no external service |
//! | `kafka`  | `kafka`  | librdkafka via `rdkafka`               |
//!
//! [`BackendSession`] turns a [`BackendConfig`] into factories and stream
//! benchmarks, so callers never name a backend type directly.
//!
//! [`Requester`]: log_bench_core::Requester
//! [`StreamBenchmark`]: log_bench_core::StreamBenchmark

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod memory;
mod session;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{Backend, BackendConfig, BackendError, DEFAULT_CLIENT_ID, DEFAULT_TOPIC};
pub use memory::{MemoryBenchmark, MemoryBroker, MemoryRequester, MemoryRequesterFactory};
pub use session::BackendSession;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBenchmark, KafkaRequester, KafkaRequesterFactory};
