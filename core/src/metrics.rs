//! Latency histograms, percentile distributions and run summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{BenchError, BenchResult};

/// Highest latency the histogram tracks: one hour, in microseconds
pub const MAX_TRACKABLE_MICROS: u64 = 3_600_000_000;

/// Percentiles reported in every [`LatencyDistribution`], in order
pub const DEFAULT_PERCENTILES: [f64; 6] = [50.0, 75.0, 90.0, 95.0, 99.0, 99.9];

// Absorbs float error in `p * n / 100` so exact ranks do not round up
const RANK_EPSILON: f64 = 1e-9;

/// Nearest-rank index (1-based) of `percentile` among `total` samples
pub fn nearest_rank(percentile: f64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let p = percentile.clamp(0.0, 100.0);
    let rank = (p * total as f64 / 100.0 - RANK_EPSILON).ceil();
    (rank.max(0.0) as u64).clamp(1, total)
}

// ============================================================================
// Histogram
// ============================================================================

/// Bounded-memory latency histogram
///
/// Uses HdrHistogram with microsecond resolution and three significant
/// digits: values below 2048us are exact, larger ones are kept within 0.1%.
/// Merging is a commutative add, so per-worker histograms can be combined in
/// any order.
#[derive(Clone)]
pub struct LatencyHistogram {
    histogram: hdrhistogram::Histogram<u64>,
}

impl LatencyHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        // Static bounds, creation cannot fail
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, MAX_TRACKABLE_MICROS, 3)
            .expect("valid histogram bounds");
        Self { histogram }
    }

    /// Record a duration, saturating at one hour
    pub fn record(&mut self, duration: Duration) {
        self.record_micros(duration_micros(duration));
    }

    /// Record a value in microseconds, saturating at one hour
    pub fn record_micros(&mut self, micros: u64) {
        self.histogram.saturating_record(micros.min(MAX_TRACKABLE_MICROS));
    }

    /// Record a duration and back-fill the samples a stalled client skipped
    ///
    /// `expected_interval` is the time between two requests of one worker at
    /// the target rate.
    pub fn record_corrected(&mut self, duration: Duration, expected_interval: Duration) {
        let micros = duration_micros(duration).min(MAX_TRACKABLE_MICROS);
        let interval = duration_micros(expected_interval);
        if self.histogram.record_correct(micros, interval).is_err() {
            self.histogram.saturating_record(micros);
        }
    }

    /// Add every sample of `other` into this histogram
    pub fn merge(&mut self, other: &LatencyHistogram) -> BenchResult<()> {
        self.histogram
            .add(&other.histogram)
            .map_err(|e| BenchError::orchestration(format!("histogram merge failed: {e:?}")))
    }

    /// Number of recorded samples
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Lowest recorded value (us), 0 when empty
    pub fn min_micros(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.histogram.min()
        }
    }

    /// Highest recorded value (us), 0 when empty
    pub fn max_micros(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.histogram.max()
        }
    }

    /// Nearest-rank percentile (us), no interpolation
    ///
    /// Returns the representative value of the bucket holding the sample at
    /// rank `ceil(p/100 * n)`.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let total = self.histogram.len();
        if total == 0 {
            return 0;
        }
        let rank = nearest_rank(percentile, total);
        let mut seen = 0u64;
        for value in self.histogram.iter_recorded() {
            seen += value.count_at_value();
            if seen >= rank {
                return value.value_iterated_to();
            }
        }
        self.histogram.max()
    }

    /// Summarize the histogram at the given percentiles
    pub fn distribution(&self, percentiles: &[f64]) -> LatencyDistribution {
        if self.is_empty() {
            return LatencyDistribution {
                percentiles: percentiles
                    .iter()
                    .map(|&percentile| PercentileValue {
                        percentile,
                        value_us: 0,
                    })
                    .collect(),
                ..Default::default()
            };
        }

        LatencyDistribution {
            count: self.len(),
            min_us: self.min_micros(),
            max_us: self.max_micros(),
            mean_us: self.histogram.mean(),
            stddev_us: self.histogram.stdev(),
            percentiles: percentiles
                .iter()
                .map(|&percentile| PercentileValue {
                    percentile,
                    value_us: self.value_at_percentile(percentile),
                })
                .collect(),
        }
    }

    /// Walk the distribution in quantile steps for detailed reports
    ///
    /// `ticks_per_half_distance` controls how many rows are produced for each
    /// halving of the remaining distance to 100%.
    pub fn quantile_ticks(&self, ticks_per_half_distance: u32) -> Vec<QuantileTick> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut total_count = 0u64;
        self.histogram
            .iter_quantiles(ticks_per_half_distance.max(1))
            .map(|value| {
                total_count += value.count_since_last_iteration();
                QuantileTick {
                    value_us: value.value_iterated_to(),
                    quantile: value.quantile_iterated_to(),
                    total_count,
                }
            })
            .collect()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LatencyHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyHistogram")
            .field("len", &self.len())
            .field("min_us", &self.min_micros())
            .field("max_us", &self.max_micros())
            .finish()
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// One row of a detailed quantile walk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileTick {
    /// Latency at this step (us)
    pub value_us: u64,
    /// Quantile reached (0.0 - 1.0)
    pub quantile: f64,
    /// Samples at or below `value_us`
    pub total_count: u64,
}

// ============================================================================
// Distribution
// ============================================================================

/// Latency at one percentile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    /// Percentile (0 - 100)
    pub percentile: f64,
    /// Latency in microseconds
    pub value_us: u64,
}

/// Latency distribution, all values in microseconds
///
/// `percentiles` keeps the order it was requested in, so serialized output is
/// stable and diffable between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LatencyDistribution {
    /// Number of samples
    pub count: u64,
    /// Minimum value
    pub min_us: u64,
    /// Maximum value
    pub max_us: u64,
    /// Mean value
    pub mean_us: f64,
    /// Standard deviation
    pub stddev_us: f64,
    /// Ordered percentile list
    pub percentiles: Vec<PercentileValue>,
}

impl LatencyDistribution {
    /// Latency (us) at exactly `percentile`, if it was computed
    pub fn percentile(&self, percentile: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|p| (p.percentile - percentile).abs() < f64::EPSILON)
            .map(|p| p.value_us)
    }

    /// Median latency
    pub fn p50(&self) -> Duration {
        Duration::from_micros(self.percentile(50.0).unwrap_or_default())
    }

    /// 99th percentile latency
    pub fn p99(&self) -> Duration {
        Duration::from_micros(self.percentile(99.0).unwrap_or_default())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Final, immutable result of a closed-loop run
///
/// Built once every worker has stopped. `total_requests` always equals
/// `successes + errors`, and `successes` equals the number of latency samples.
#[derive(Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Backend the run targeted
    pub backend: String,
    /// Number of concurrent connections
    pub connections: usize,
    /// Configured aggregate rate, None when unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub ended_at: DateTime<Utc>,
    /// Run duration
    pub elapsed: Duration,
    /// Requests issued
    pub total_requests: u64,
    /// Requests that completed successfully
    pub successes: u64,
    /// Requests that failed
    pub errors: u64,
    /// Successful requests per second
    pub throughput: f64,
    /// Distribution of successful request latencies
    pub latency: LatencyDistribution,
    /// Latencies corrected for coordinated omission (rate-limited runs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_latency: Option<LatencyDistribution>,
    /// Quantile ticks per half-distance for detailed reports
    pub report_granularity: u32,
    #[serde(skip)]
    pub(crate) histogram: LatencyHistogram,
    #[serde(skip)]
    pub(crate) corrected_histogram: Option<LatencyHistogram>,
}

impl Summary {
    /// Merged histogram of successful request latencies
    ///
    /// Empty on a deserialized summary.
    pub fn histogram(&self) -> &LatencyHistogram {
        &self.histogram
    }

    /// Merged coordinated-omission corrected histogram
    pub fn corrected_histogram(&self) -> Option<&LatencyHistogram> {
        self.corrected_histogram.as_ref()
    }

    /// Error rate (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_requests as f64
        }
    }

    /// Whether any request failed
    pub fn is_degraded(&self) -> bool {
        self.errors > 0
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summary")
            .field("backend", &self.backend)
            .field("connections", &self.connections)
            .field("rate_limit", &self.rate_limit)
            .field("elapsed", &self.elapsed)
            .field("total_requests", &self.total_requests)
            .field("successes", &self.successes)
            .field("errors", &self.errors)
            .field("throughput", &self.throughput)
            .finish()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self
            .rate_limit
            .map(|r| format!("{r}/s"))
            .unwrap_or_else(|| "unlimited".to_string());
        writeln!(f, "Backend:      {}", self.backend)?;
        writeln!(f, "Connections:  {}", self.connections)?;
        writeln!(f, "Request rate: {rate}")?;
        writeln!(f, "Requests:     {}", self.total_requests)?;
        writeln!(f, "Successes:    {}", self.successes)?;
        writeln!(f, "Errors:       {}", self.errors)?;
        writeln!(f, "Elapsed:      {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Throughput:   {:.2}/s", self.throughput)?;
        writeln!(
            f,
            "Latency:      min {:.3}ms  mean {:.3}ms  max {:.3}ms",
            self.latency.min_us as f64 / 1000.0,
            self.latency.mean_us / 1000.0,
            self.latency.max_us as f64 / 1000.0
        )?;
        for p in &self.latency.percentiles {
            writeln!(
                f,
                "  p{:<6} {:.3}ms",
                p.percentile,
                p.value_us as f64 / 1000.0
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Independent nearest-rank reference over a plain sorted vector
    fn reference_nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
        let n = sorted.len();
        let rank = ((percentile / 100.0) * n as f64).ceil() as usize;
        sorted[rank.clamp(1, n) - 1]
    }

    #[test]
    fn test_nearest_rank_indices() {
        assert_eq!(nearest_rank(50.0, 100), 50);
        assert_eq!(nearest_rank(99.0, 100), 99);
        assert_eq!(nearest_rank(99.9, 1000), 999);
        assert_eq!(nearest_rank(0.0, 10), 1);
        assert_eq!(nearest_rank(100.0, 10), 10);
        assert_eq!(nearest_rank(50.0, 1), 1);
        assert_eq!(nearest_rank(50.0, 0), 0);
    }

    #[test]
    fn test_percentiles_match_reference_exact_range() {
        // 1..=1000us sits entirely in the exact range of the histogram
        let samples: Vec<u64> = (1..=1000).collect();
        let mut histogram = LatencyHistogram::new();
        for &s in &samples {
            histogram.record_micros(s);
        }

        for p in [50.0, 90.0, 99.0, 99.9] {
            assert_eq!(
                histogram.value_at_percentile(p),
                reference_nearest_rank(&samples, p),
                "p{p}"
            );
        }
    }

    #[test]
    fn test_percentiles_millisecond_samples_within_precision() {
        // 1..=100ms, recorded as durations
        let samples: Vec<u64> = (1..=100).map(|ms| ms * 1000).collect();
        let mut histogram = LatencyHistogram::new();
        for &s in &samples {
            histogram.record(Duration::from_micros(s));
        }

        for p in [50.0, 99.0] {
            let expected = reference_nearest_rank(&samples, p) as f64;
            let actual = histogram.value_at_percentile(p) as f64;
            assert!(
                (actual - expected).abs() / expected < 0.001,
                "p{p}: {actual} vs {expected}"
            );
        }
        assert_eq!(histogram.value_at_percentile(50.0) / 1000, 50);
        assert_eq!(histogram.value_at_percentile(99.0) / 1000, 99);
    }

    #[test]
    fn test_percentiles_independent_of_order() {
        let forward: Vec<u64> = (1..=500).map(|v| v * 7 % 1999 + 1).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let mut a = LatencyHistogram::new();
        let mut b = LatencyHistogram::new();
        for &v in &forward {
            a.record_micros(v);
        }
        for &v in &reversed {
            b.record_micros(v);
        }

        assert_eq!(
            a.distribution(&DEFAULT_PERCENTILES),
            b.distribution(&DEFAULT_PERCENTILES)
        );
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut left = LatencyHistogram::new();
        let mut right = LatencyHistogram::new();
        for v in 1..=300 {
            left.record_micros(v);
        }
        for v in 200..=900 {
            right.record_micros(v * 3);
        }

        let mut ab = LatencyHistogram::new();
        ab.merge(&left).unwrap();
        ab.merge(&right).unwrap();

        let mut ba = LatencyHistogram::new();
        ba.merge(&right).unwrap();
        ba.merge(&left).unwrap();

        assert_eq!(ab.len(), 300 + 701);
        assert_eq!(
            ab.distribution(&DEFAULT_PERCENTILES),
            ba.distribution(&DEFAULT_PERCENTILES)
        );
    }

    #[test]
    fn test_empty_histogram_distribution() {
        let histogram = LatencyHistogram::new();
        let dist = histogram.distribution(&DEFAULT_PERCENTILES);
        assert_eq!(dist.count, 0);
        assert_eq!(dist.min_us, 0);
        assert_eq!(dist.max_us, 0);
        assert_eq!(dist.percentiles.len(), DEFAULT_PERCENTILES.len());
        assert!(dist.percentiles.iter().all(|p| p.value_us == 0));
        assert_eq!(histogram.value_at_percentile(50.0), 0);
    }

    #[test]
    fn test_histogram_saturates_at_max() {
        let mut histogram = LatencyHistogram::new();
        histogram.record(Duration::from_secs(10 * 3600));
        assert_eq!(histogram.len(), 1);
        assert!(histogram.max_micros() >= MAX_TRACKABLE_MICROS);
    }

    #[test]
    fn test_corrected_recording_backfills() {
        let mut histogram = LatencyHistogram::new();
        // A 100ms stall at a 10ms expected interval back-fills 90, 80, ... 10ms
        histogram.record_corrected(Duration::from_millis(100), Duration::from_millis(10));
        assert_eq!(histogram.len(), 10);

        let mut plain = LatencyHistogram::new();
        plain.record_corrected(Duration::from_millis(5), Duration::from_millis(10));
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn test_quantile_ticks_cover_all_samples() {
        let mut histogram = LatencyHistogram::new();
        for v in 1..=1000 {
            histogram.record_micros(v);
        }
        let ticks = histogram.quantile_ticks(5);
        assert!(!ticks.is_empty());
        let last = ticks.last().unwrap();
        assert_eq!(last.total_count, 1000);
        assert_eq!(last.value_us, 1000);
        assert!(ticks.windows(2).all(|w| w[0].quantile <= w[1].quantile));
    }

    #[test]
    fn test_distribution_keeps_percentile_order() {
        let mut histogram = LatencyHistogram::new();
        for v in 1..=100 {
            histogram.record_micros(v);
        }
        let dist = histogram.distribution(&[99.0, 50.0, 90.0]);
        let order: Vec<f64> = dist.percentiles.iter().map(|p| p.percentile).collect();
        assert_eq!(order, vec![99.0, 50.0, 90.0]);
        assert_eq!(dist.percentile(50.0), Some(50));
        assert_eq!(dist.percentile(75.0), None);
        assert_eq!(dist.p99(), Duration::from_micros(99));
    }
}
