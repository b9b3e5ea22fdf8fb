//! Aggregate request pacing

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Token bucket pacing requests across all workers of a run
///
/// One instance is shared through an `Arc`, so the configured rate is the
/// aggregate rate, not a per-worker one. The bucket holds a single permit:
/// idle time is not banked into a later burst, so over any window `D` at most
/// `rate * D + 1` permits are handed out.
pub struct RequestRateLimiter {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    rate_limit: Option<f64>,
}

impl RequestRateLimiter {
    /// Create a limiter for `rate_limit` permits per second
    ///
    /// `None`, zero, negative or non-finite rates disable limiting.
    ///
    /// # Examples
    /// ```
    /// use log_bench_core::worker::RequestRateLimiter;
    ///
    /// let limiter = RequestRateLimiter::new(Some(5000.0));
    /// assert!(limiter.is_enabled());
    ///
    /// let unlimited = RequestRateLimiter::new(None);
    /// assert!(!unlimited.is_enabled());
    /// ```
    pub fn new(rate_limit: Option<f64>) -> Self {
        let limiter = rate_limit
            .filter(|rps| rps.is_finite() && *rps > 0.0)
            .and_then(|rps| {
                // Fractional rates keep their exact period (0.5/s is one every 2s)
                let period = Duration::try_from_secs_f64(1.0 / rps)
                    .ok()?
                    .max(Duration::from_nanos(1));
                let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
                Some(RateLimiter::direct(quota))
            });

        let rate_limit = limiter.as_ref().and(rate_limit);
        Self {
            limiter,
            rate_limit,
        }
    }

    /// Limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Wait for one permit
    pub async fn wait(&self) {
        self.acquire(1).await;
    }

    /// Wait for `n` permits, taken one at a time
    ///
    /// Taking permits singly keeps the limiter fair: a waiter asking for many
    /// permits never blocks the bucket for the others.
    pub async fn acquire(&self, n: u32) {
        if let Some(ref limiter) = self.limiter {
            for _ in 0..n {
                limiter.until_ready().await;
            }
        }
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    /// Whether pacing is in effect
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured permits per second, None when unlimited
    pub fn rate_limit(&self) -> Option<f64> {
        self.rate_limit
    }
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("rate_limit", &self.rate_limit)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_disabled_rates() {
        for rate in [None, Some(0.0), Some(-10.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let limiter = RequestRateLimiter::new(rate);
            assert!(!limiter.is_enabled(), "{rate:?}");
            assert!(limiter.rate_limit().is_none());
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn test_enabled_rate() {
        let limiter = RequestRateLimiter::new(Some(100.0));
        assert!(limiter.is_enabled());
        assert_eq!(limiter.rate_limit(), Some(100.0));
    }

    #[test]
    fn test_burst_is_one_permit() {
        let limiter = RequestRateLimiter::new(Some(10.0));
        assert!(limiter.try_acquire());
        // The next permit is 100ms away
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RequestRateLimiter::unlimited();
        let start = Instant::now();
        limiter.acquire(10_000).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_acquire_paces_permits() {
        let limiter = RequestRateLimiter::new(Some(100.0));
        let start = Instant::now();
        // First permit is immediate, the next 20 take 10ms each
        limiter.acquire(21).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(180), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_shared_limiter_is_aggregate() {
        let limiter = Arc::new(RequestRateLimiter::new(Some(200.0)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire(10).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 40 permits at 200/s need at least 39 periods of 5ms
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_idle_time_is_not_banked() {
        let limiter = RequestRateLimiter::new(Some(20.0));
        limiter.wait().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Four periods elapsed, but only one permit is ready
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_debug() {
        let limiter = RequestRateLimiter::new(Some(100.0));
        let debug = format!("{:?}", limiter);
        assert!(debug.contains("RequestRateLimiter"));
        assert!(debug.contains("100.0"));
        assert!(debug.contains("true"));
    }
}
