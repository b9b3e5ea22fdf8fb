//! Error types for log-bench-core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Phase of a benchmark run that produced a [`BenchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchErrorKind {
    /// Connection or configuration failure before any request was issued
    Setup,
    /// Open-loop producer could not send a message
    Send,
    /// Invalid or incomplete configuration
    Config,
    /// Worker pool coordination failed (task panics, aggregation)
    Orchestration,
    /// The run was shut down while an operation was pending
    Shutdown,
}

impl BenchErrorKind {
    /// Short phase label used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchErrorKind::Setup => "setup",
            BenchErrorKind::Send => "send",
            BenchErrorKind::Config => "config",
            BenchErrorKind::Orchestration => "orchestration",
            BenchErrorKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for BenchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal benchmark error
///
/// Carries the phase that failed plus enough context (worker index, messages
/// already sent) for the caller to report what happened.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct BenchError {
    /// Phase that failed
    pub kind: BenchErrorKind,
    /// Human-readable description
    pub message: String,
    /// Worker that failed, when the error is tied to one
    pub worker_id: Option<usize>,
    /// Messages successfully sent before a send failure
    pub sent: Option<u64>,
}

impl BenchError {
    fn new(kind: BenchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            worker_id: None,
            sent: None,
        }
    }

    /// A requester failed to connect for the given worker
    pub fn setup(worker_id: usize, message: impl fmt::Display) -> Self {
        Self {
            worker_id: Some(worker_id),
            ..Self::new(
                BenchErrorKind::Setup,
                format!("worker {worker_id}: {message}"),
            )
        }
    }

    /// Backend setup failed outside of a worker (open-loop mode)
    pub fn backend_setup(message: impl fmt::Display) -> Self {
        Self::new(BenchErrorKind::Setup, message.to_string())
    }

    /// The producer aborted after `sent` successful sends
    pub fn send(sent: u64, message: impl fmt::Display) -> Self {
        Self {
            sent: Some(sent),
            ..Self::new(
                BenchErrorKind::Send,
                format!("aborted after {sent} messages: {message}"),
            )
        }
    }

    /// Invalid configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(BenchErrorKind::Config, message)
    }

    /// A required builder field was not provided
    pub fn missing_config(field: &str) -> Self {
        Self::new(
            BenchErrorKind::Config,
            format!("missing required field: {field}"),
        )
    }

    /// Worker pool coordination failure
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::new(BenchErrorKind::Orchestration, message)
    }

    /// The run was stopped while waiting
    pub fn shutdown() -> Self {
        Self::new(BenchErrorKind::Shutdown, "benchmark shut down")
    }

    /// Whether the error happened before any measurement began
    pub fn is_setup(&self) -> bool {
        self.kind == BenchErrorKind::Setup
    }
}

impl From<crate::config::ConfigError> for BenchError {
    fn from(err: crate::config::ConfigError) -> Self {
        BenchError::config(err.to_string())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
