//! Open-loop driver state and results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::ErrorPolicy;
use crate::traits::Role;

/// Lifecycle of a producer or consumer driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Not started
    Idle,
    /// Producer loop running
    Sending,
    /// Consumer loop running
    Receiving,
    /// Loop finished, successfully or not
    Done,
}

/// Result of one open-loop producer or consumer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    /// Side that produced the report
    pub role: Role,
    /// Messages sent (producer) or received (consumer)
    pub messages: u64,
    /// Soft per-message errors reported by the backend
    pub errors: u64,
    /// Producer: first send to flush. Consumer: first receipt to last.
    pub elapsed: Duration,
    /// Whether the configured message count was reached
    pub completed: bool,
    /// How `errors` affect [`throughput`](Self::throughput)
    pub error_policy: ErrorPolicy,
}

impl ThroughputReport {
    /// Messages counted toward throughput under the error policy
    pub fn counted_messages(&self) -> u64 {
        match self.error_policy {
            ErrorPolicy::Include => self.messages,
            ErrorPolicy::Exclude => self.messages.saturating_sub(self.errors),
        }
    }

    /// Messages per second
    ///
    /// `None` when no time was measured: a single message, or every message
    /// observed within one clock tick. Such a run can still be complete.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.counted_messages() as f64 / secs)
    }

    /// Whether the run was cut short or saw per-message errors
    pub fn is_degraded(&self) -> bool {
        !self.completed || self.errors > 0
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self
            .throughput()
            .map(|r| format!("{r:.2} msg/s"))
            .unwrap_or_else(|| "n/a msg/s".to_string());
        write!(
            f,
            "{}: {} messages in {:.3}s ({rate}), {} errors",
            self.role,
            self.messages,
            self.elapsed.as_secs_f64(),
            self.errors
        )?;
        if !self.completed {
            f.write_str(" [incomplete]")?;
        }
        Ok(())
    }
}
