//! Worker statistics tracking

use std::time::{Duration, Instant};

use crate::error::BenchResult;
use crate::metrics::LatencyHistogram;

/// Statistics owned by a single worker
///
/// Nothing here is shared while the run is in progress. The orchestrator
/// merges the stats of every worker once they have all stopped.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Number of successfully completed requests
    pub completed: u64,

    /// Number of failed requests
    pub errors: u64,

    /// Latencies of successful requests
    pub histogram: LatencyHistogram,

    /// Latencies corrected for coordinated omission, when a rate is set
    pub corrected: Option<LatencyHistogram>,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Create stats that also track corrected latencies
    pub fn with_correction() -> Self {
        Self {
            corrected: Some(LatencyHistogram::new()),
            ..Self::default()
        }
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Requests issued (completed + errors)
    pub fn total_requests(&self) -> u64 {
        self.completed + self.errors
    }

    /// Error rate (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests() == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_requests() as f64
        }
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Record a successful request
    ///
    /// `expected_interval` is the per-worker gap at the target rate; when
    /// given, the corrected histogram back-fills stalled samples.
    pub fn record_success(&mut self, latency: Duration, expected_interval: Option<Duration>) {
        self.completed += 1;
        self.histogram.record(latency);
        if let (Some(corrected), Some(interval)) = (self.corrected.as_mut(), expected_interval) {
            corrected.record_corrected(latency, interval);
        }
    }

    /// Record a failed request
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Merge stats from another worker
    pub fn merge(&mut self, other: &WorkerStats) -> BenchResult<()> {
        self.completed += other.completed;
        self.errors += other.errors;
        self.histogram.merge(&other.histogram)?;
        match (self.corrected.as_mut(), other.corrected.as_ref()) {
            (Some(mine), Some(theirs)) => mine.merge(theirs)?,
            (None, Some(theirs)) => self.corrected = Some(theirs.clone()),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_empty() {
        let stats = WorkerStats::default();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.errors, 0);
        assert!(stats.histogram.is_empty());
        assert!(stats.corrected.is_none());
        assert!(stats.started_at.is_none());
        assert!(stats.ended_at.is_none());
    }

    #[test]
    fn test_success_records_latency() {
        let mut stats = WorkerStats::new();
        stats.record_success(Duration::from_micros(150), None);
        stats.record_success(Duration::from_micros(250), None);

        assert_eq!(stats.completed, 2);
        assert_eq!(stats.histogram.len(), 2);
        assert_eq!(stats.histogram.min_micros(), 150);
    }

    #[test]
    fn test_worker_stats_corrected_only_with_interval() {
        let mut stats = WorkerStats::with_correction();
        stats.record_success(Duration::from_millis(40), Some(Duration::from_millis(10)));
        stats.record_success(Duration::from_millis(40), None);

        assert_eq!(stats.histogram.len(), 2);
        assert_eq!(stats.corrected.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn test_errors_skip_histogram() {
        let mut stats = WorkerStats::new();
        stats.record_error();
        stats.record_error();

        assert_eq!(stats.errors, 2);
        assert_eq!(stats.completed, 0);
        assert!(stats.histogram.is_empty());
        assert!((stats.error_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_adds_counts_and_samples() {
        let mut stats1 = WorkerStats::new();
        stats1.record_success(Duration::from_micros(100), None);
        stats1.record_error();

        let mut stats2 = WorkerStats::with_correction();
        stats2.record_success(Duration::from_micros(300), Some(Duration::from_millis(1)));
        stats2.record_success(Duration::from_micros(500), Some(Duration::from_millis(1)));

        stats1.merge(&stats2).unwrap();

        assert_eq!(stats1.completed, 3);
        assert_eq!(stats1.errors, 1);
        assert_eq!(stats1.total_requests(), 4);
        assert_eq!(stats1.histogram.len(), 3);
        assert_eq!(stats1.corrected.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_elapsed_between_start_and_stop() {
        let mut stats = WorkerStats::new();
        assert!(stats.elapsed().is_none());

        stats.start();
        assert!(stats.started_at.is_some());
        assert!(stats.elapsed().is_some());

        std::thread::sleep(Duration::from_millis(10));
        stats.stop();

        let elapsed = stats.elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(10));
    }
}
