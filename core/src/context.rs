//! Run-scoped timing context
//!
//! The start of a run is captured once and handed to every worker, instead of
//! each component reading a process-wide clock origin.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::traits::StopCondition;

/// Start time and optional deadline of one benchmark run
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    started: Instant,
    started_at: DateTime<Utc>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Capture the current instant as the start of a run
    pub fn start(stop_condition: &StopCondition) -> Self {
        Self::starting_at(Instant::now(), Utc::now(), stop_condition)
    }

    /// Build a context from an explicit start instant
    pub fn starting_at(
        started: Instant,
        started_at: DateTime<Utc>,
        stop_condition: &StopCondition,
    ) -> Self {
        let deadline = match stop_condition {
            StopCondition::Duration(d) => started.checked_add(*d),
            _ => None,
        };
        Self {
            started,
            started_at,
            deadline,
        }
    }

    /// Monotonic start instant
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Wall-clock start time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Deadline for duration-bounded runs
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether a duration-bounded run has reached its deadline
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Idle for `period` after a run, keeping connections open
pub async fn drain(period: Duration) {
    if period.is_zero() {
        return;
    }
    tracing::info!(drain_secs = period.as_secs_f64(), "Draining before exit");
    tokio::time::sleep(period).await;
}
