//! Builder pattern for Worker construction

use crate::context::RunContext;
use crate::error::{BenchError, BenchResult};
use crate::traits::{Requester, StopCondition};

use super::executor::Worker;
use super::rate_limiter::RequestRateLimiter;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .requester(requester)
///     .payload(payload)
///     .rate_limiter(limiter)
///     .stop_condition(StopCondition::RequestCount(100))
///     .context(ctx)
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: usize,
    requester: Option<Box<dyn Requester>>,
    payload: Option<Arc<[u8]>>,
    rate_limiter: Option<Arc<RequestRateLimiter>>,
    stop_condition: Option<StopCondition>,
    context: Option<RunContext>,
    request_counter: Option<Arc<AtomicUsize>>,
    expected_interval: Option<Duration>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            requester: None,
            payload: None,
            rate_limiter: None,
            stop_condition: None,
            context: None,
            request_counter: None,
            expected_interval: None,
        }
    }

    /// Set the (already set up) requester
    pub fn requester(mut self, requester: Box<dyn Requester>) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Set the request payload
    pub fn payload(mut self, payload: Arc<[u8]>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the shared rate limiter; unlimited if never set
    pub fn rate_limiter(mut self, limiter: Arc<RequestRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = Some(condition);
        self
    }

    /// Set the run context
    pub fn context(mut self, context: RunContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Share a request counter with the other workers of the run
    pub fn request_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.request_counter = Some(counter);
        self
    }

    /// Record corrected latencies against this per-worker interval
    pub fn expected_interval(mut self, interval: Option<Duration>) -> Self {
        self.expected_interval = interval;
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing.
    pub fn build(self) -> BenchResult<Worker> {
        let requester = self
            .requester
            .ok_or_else(|| BenchError::missing_config("requester"))?;
        let payload = self.payload.ok_or_else(|| BenchError::missing_config("payload"))?;
        let stop_condition = self
            .stop_condition
            .ok_or_else(|| BenchError::missing_config("stop_condition"))?;
        let context = self.context.ok_or_else(|| BenchError::missing_config("context"))?;
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RequestRateLimiter::unlimited()));

        let total = match stop_condition {
            StopCondition::RequestCount(total) => Some(total),
            _ => None,
        };

        let worker = Worker::new(
            self.id,
            requester,
            payload,
            rate_limiter,
            stop_condition,
            context,
        )
        .with_expected_interval(self.expected_interval);

        // A count-bounded worker without a shared counter owns the whole count
        Ok(match total {
            Some(total) => {
                let counter = self
                    .request_counter
                    .unwrap_or_else(|| Arc::new(AtomicUsize::new(0)));
                worker.with_request_counter(counter, total)
            }
            None => worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RequestError;
    use async_trait::async_trait;

    struct NoopRequester;

    #[async_trait]
    impl Requester for NoopRequester {
        async fn setup(&mut self) -> Result<(), RequestError> {
            Ok(())
        }
        async fn request(&mut self, _payload: &[u8]) -> Result<Vec<u8>, RequestError> {
            Ok(Vec::new())
        }
        async fn teardown(&mut self) -> Result<(), RequestError> {
            Ok(())
        }
    }

    fn complete() -> WorkerBuilder {
        let stop = StopCondition::RequestCount(10);
        WorkerBuilder::new(0)
            .requester(Box::new(NoopRequester))
            .payload(Arc::from(vec![0u8; 16]))
            .context(RunContext::start(&stop))
            .stop_condition(stop)
    }

    #[test]
    fn test_builder_complete() {
        let worker = complete().build().unwrap();
        assert_eq!(worker.id(), 0);
    }

    #[test]
    fn test_builder_missing_requester() {
        let stop = StopCondition::RequestCount(10);
        let result = WorkerBuilder::new(0)
            .payload(Arc::from(vec![0u8; 16]))
            .context(RunContext::start(&stop))
            .stop_condition(stop)
            .build();

        let err = result.unwrap_err();
        assert!(err.message.contains("requester"));
    }

    #[test]
    fn test_builder_missing_payload() {
        let stop = StopCondition::RequestCount(10);
        let result = WorkerBuilder::new(0)
            .requester(Box::new(NoopRequester))
            .context(RunContext::start(&stop))
            .stop_condition(stop)
            .build();

        assert!(result.unwrap_err().message.contains("payload"));
    }

    #[test]
    fn test_builder_missing_stop_condition() {
        let result = WorkerBuilder::new(0)
            .requester(Box::new(NoopRequester))
            .payload(Arc::from(vec![0u8; 16]))
            .context(RunContext::start(&StopCondition::Indefinite))
            .build();

        assert!(result.unwrap_err().message.contains("stop_condition"));
    }

    #[test]
    fn test_builder_missing_context() {
        let result = WorkerBuilder::new(0)
            .requester(Box::new(NoopRequester))
            .payload(Arc::from(vec![0u8; 16]))
            .stop_condition(StopCondition::Indefinite)
            .build();

        assert!(result.unwrap_err().message.contains("context"));
    }
}
