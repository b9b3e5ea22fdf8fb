//! Core traits for backend requesters and stream benchmarks
//!
//! These traits are defined in core so the engine never depends on a
//! specific broker. Implementations live in the backends crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Requester
// ============================================================================

/// A single logical client driven by one closed-loop worker
///
/// Lifecycle is `setup -> request* -> teardown`. A requester is owned by
/// exactly one worker and is never shared, so implementations do not need to
/// be `Sync`.
#[async_trait]
pub trait Requester: Send {
    /// Open the connection (and any subscription needed to observe replies)
    async fn setup(&mut self) -> Result<(), RequestError>;

    /// Issue one request and wait for it to complete
    ///
    /// Returns the reply payload, or an empty vector for backends that only
    /// acknowledge.
    async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, RequestError>;

    /// Release the connection
    async fn teardown(&mut self) -> Result<(), RequestError>;
}

/// Creates one [`Requester`] per worker
pub trait RequesterFactory: Send + Sync {
    /// Backend identifier (e.g., "memory", "kafka")
    fn name(&self) -> &str;

    /// Size in bytes of the synthetic request payload
    fn payload_size(&self) -> usize;

    /// Build a fresh, not yet connected requester for `worker_index`
    fn get_requester(&self, worker_index: usize) -> Box<dyn Requester>;

    /// Synthetic payload sent with every request
    fn payload(&self) -> Vec<u8> {
        crate::payload::random_payload(self.payload_size())
    }
}

// ============================================================================
// Stream benchmark (open loop)
// ============================================================================

/// Which side of an open-loop benchmark a process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends messages as fast as possible
    Producer,
    /// Counts received messages
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Backend surface consumed by the open-loop [`Producer`](crate::Producer)
/// and [`Consumer`](crate::Consumer) drivers
#[async_trait]
pub trait StreamBenchmark: Send {
    /// Backend identifier
    fn name(&self) -> &str;

    /// Connect as `role`, expecting `message_count` messages in total
    async fn setup(&mut self, role: Role, message_count: u64) -> Result<(), RequestError>;

    /// Publish the next synthetic message
    async fn send(&mut self) -> Result<(), RequestError>;

    /// Wait until every sent message has been handed off to the broker
    async fn send_done(&mut self) -> Result<(), RequestError>;

    /// Take the channel of received payloads (consumer role, after setup)
    fn take_receiver(&mut self) -> Option<mpsc::Receiver<Vec<u8>>>;

    /// Soft per-message failures observed so far (malformed, duplicate, lost)
    fn errors(&self) -> u64;
}

// ============================================================================
// Errors
// ============================================================================

/// Backend-facing request errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// Could not reach or stay connected to the broker
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker did not answer in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The broker refused the message
    #[error("rejected: {0}")]
    Rejected(String),

    /// The requester or broker has already been shut down
    #[error("closed: {0}")]
    Closed(String),

    /// Anything else reported by the backend
    #[error("{0}")]
    Other(String),
}

impl RequestError {
    /// Whether the error means the connection itself is unusable
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RequestError::Connection(_) | RequestError::Closed(_))
    }
}

// ============================================================================
// Stop Condition
// ============================================================================

/// Closed-loop stop condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Issue exactly N requests in total (claimed across workers)
    RequestCount(usize),

    /// Run for the specified wall-clock duration
    Duration(Duration),

    /// Run until explicitly shut down (Ctrl+C)
    Indefinite,
}

impl Default for StopCondition {
    fn default() -> Self {
        StopCondition::Duration(Duration::from_secs(15))
    }
}
