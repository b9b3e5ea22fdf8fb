//! Builder pattern for Orchestrator construction

use std::sync::Arc;
use std::time::Duration;

use crate::config::ExperimentConfig;
use crate::error::{BenchError, BenchResult};
use crate::traits::{RequesterFactory, StopCondition};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .connections(4)
///     .stop_condition(StopCondition::Duration(Duration::from_secs(15)))
///     .rate_limit(Some(5000.0))
///     .factory(factory)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: ExperimentConfig,
    factory: Option<Arc<dyn RequesterFactory>>,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ExperimentConfig::default(),
            factory: None,
        }
    }

    /// Set the full experiment configuration
    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of connections (one worker each)
    pub fn connections(mut self, connections: usize) -> Self {
        self.config.connections = connections;
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, stop: StopCondition) -> Self {
        self.config.stop_condition = stop;
        self
    }

    /// Set the aggregate rate limit (requests per second)
    pub fn rate_limit(mut self, rps: Option<f64>) -> Self {
        self.config.rate_limit = rps;
        self
    }

    /// Set the report granularity
    pub fn report_granularity(mut self, ticks: u32) -> Self {
        self.config.report_granularity = ticks;
        self
    }

    /// Set the post-run drain period
    pub fn drain(mut self, drain: Duration) -> Self {
        self.config.drain = drain;
        self
    }

    /// Set the requester factory
    pub fn factory(mut self, factory: Arc<dyn RequesterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the factory is not set or the configuration is
    /// invalid.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let factory = self
            .factory
            .ok_or_else(|| BenchError::missing_config("factory"))?;

        self.config.validate()?;

        Ok(Orchestrator::new(self.config, factory))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
