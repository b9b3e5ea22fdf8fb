//! Experiment configuration types

use crate::traits::StopCondition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quantile ticks per half-distance in distribution reports
pub const DEFAULT_REPORT_GRANULARITY: u32 = 5;

/// Closed-loop experiment configuration
///
/// Defines how a latency benchmark is run: how many connections, how long,
/// and at what aggregate request rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Number of concurrent workers, one connection each
    pub connections: usize,

    /// Stop condition: request count, duration, or indefinite
    pub stop_condition: StopCondition,

    /// Aggregate requests per second across all workers; None is unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,

    /// Quantile ticks per half-distance used by distribution reports
    pub report_granularity: u32,

    /// Idle period after the run completes, before returning
    #[serde(default)]
    pub drain: Duration,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            connections: 1,
            stop_condition: StopCondition::default(),
            rate_limit: None,
            report_granularity: DEFAULT_REPORT_GRANULARITY,
            drain: Duration::ZERO,
        }
    }
}

impl ExperimentConfig {
    /// Create a new config with the given number of connections
    pub fn new(connections: usize) -> Self {
        Self {
            connections,
            ..Default::default()
        }
    }

    /// Set the stop condition
    pub fn with_stop_condition(mut self, stop: StopCondition) -> Self {
        self.stop_condition = stop;
        self
    }

    /// Set the aggregate rate limit
    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.rate_limit = Some(rps);
        self
    }

    /// Set the report granularity
    pub fn with_report_granularity(mut self, ticks: u32) -> Self {
        self.report_granularity = ticks;
        self
    }

    /// Set the post-run drain period
    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Rate limit if one is in effect (zero means unlimited)
    pub fn effective_rate(&self) -> Option<f64> {
        self.rate_limit.filter(|rps| *rps > 0.0)
    }

    /// Interval between two requests of the same worker at the configured rate
    ///
    /// Used to correct for coordinated omission.
    pub fn expected_interval(&self) -> Option<Duration> {
        let rps = self.effective_rate()?;
        let secs = self.connections as f64 / rps;
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::InvalidConnections(
                "connections must be at least 1".into(),
            ));
        }

        if let Some(rps) = self.rate_limit {
            if !rps.is_finite() || rps < 0.0 {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "rate limit must be a non-negative number, got {rps}"
                )));
            }
        }

        match self.stop_condition {
            StopCondition::RequestCount(0) => {
                return Err(ConfigError::InvalidStopCondition(
                    "request count must be at least 1".into(),
                ));
            }
            StopCondition::Duration(d) if d.is_zero() => {
                return Err(ConfigError::InvalidStopCondition(
                    "duration must be greater than zero".into(),
                ));
            }
            _ => {}
        }

        if self.report_granularity == 0 {
            return Err(ConfigError::InvalidGranularity(
                "report granularity must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// How per-message errors affect open-loop throughput
///
/// Has no default; callers must pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Errored messages still count as received
    Include,
    /// Errored messages are subtracted before computing throughput
    Exclude,
}

/// Open-loop experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputConfig {
    /// Messages to send, or to wait for
    pub message_count: u64,

    /// Treatment of per-message errors in the throughput figure
    pub error_policy: ErrorPolicy,

    /// Give up if no message arrives for this long (consumer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_timeout: Option<Duration>,

    /// Idle period after the run completes, before returning
    #[serde(default)]
    pub drain: Duration,
}

impl ThroughputConfig {
    /// Create a config for `message_count` messages
    pub fn new(message_count: u64, error_policy: ErrorPolicy) -> Self {
        Self {
            message_count,
            error_policy,
            recv_timeout: None,
            drain: Duration::ZERO,
        }
    }

    /// Set the consumer idle timeout
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set the post-run drain period
    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_count == 0 {
            return Err(ConfigError::InvalidStopCondition(
                "message count must be at least 1".into(),
            ));
        }
        if self.recv_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidStopCondition(
                "receive timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid connection count
    #[error("Invalid connections: {0}")]
    InvalidConnections(String),

    /// Invalid rate limit
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Invalid stop condition
    #[error("Invalid stop condition: {0}")]
    InvalidStopCondition(String),

    /// Invalid report granularity
    #[error("Invalid report granularity: {0}")]
    InvalidGranularity(String),
}
