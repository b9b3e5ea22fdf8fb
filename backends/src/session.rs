//! Backend dispatch

use std::sync::Arc;

use log_bench_core::{RequesterFactory, StreamBenchmark};

use crate::config::{Backend, BackendConfig, BackendError};
use crate::memory::{MemoryBenchmark, MemoryBroker, MemoryRequesterFactory};

/// A validated backend selection that hands out requesters and stream
/// benchmarks
///
/// For the memory backend the session owns the broker, so every requester
/// and stream benchmark it creates talks to the same topics.
#[derive(Debug)]
pub struct BackendSession {
    config: BackendConfig,
    broker: Option<MemoryBroker>,
}

impl BackendSession {
    /// Validate `config` and prepare the backend
    pub fn open(config: BackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let broker = match config.system {
            Backend::Memory => Some(MemoryBroker::new()),
            Backend::Kafka => None,
        };
        tracing::debug!(system = %config.system, url = %config.url, "Backend session opened");
        Ok(Self { config, broker })
    }

    /// Session on an existing in-process broker
    pub fn with_broker(config: BackendConfig, broker: MemoryBroker) -> Result<Self, BackendError> {
        config.validate()?;
        Ok(Self {
            config,
            broker: Some(broker),
        })
    }

    /// Connection settings
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// In-process broker, for the memory backend
    pub fn broker(&self) -> Option<&MemoryBroker> {
        self.broker.as_ref()
    }

    /// Factory for closed-loop requesters
    pub fn requester_factory(&self) -> Result<Arc<dyn RequesterFactory>, BackendError> {
        match self.config.system {
            Backend::Memory => Ok(Arc::new(MemoryRequesterFactory::new(
                self.memory_broker(),
                self.config.clone(),
            ))),
            Backend::Kafka => kafka_requester_factory(&self.config),
        }
    }

    /// Fresh open-loop stream benchmark (one per producer or consumer)
    pub fn stream_benchmark(&self) -> Result<Box<dyn StreamBenchmark>, BackendError> {
        match self.config.system {
            Backend::Memory => Ok(Box::new(MemoryBenchmark::new(
                self.memory_broker(),
                &self.config,
            ))),
            Backend::Kafka => kafka_stream_benchmark(&self.config),
        }
    }

    fn memory_broker(&self) -> MemoryBroker {
        self.broker.clone().unwrap_or_default()
    }
}

#[cfg(feature = "kafka")]
fn kafka_requester_factory(
    config: &BackendConfig,
) -> Result<Arc<dyn RequesterFactory>, BackendError> {
    Ok(Arc::new(crate::kafka::KafkaRequesterFactory::new(
        config.clone(),
    )))
}

#[cfg(not(feature = "kafka"))]
fn kafka_requester_factory(
    _config: &BackendConfig,
) -> Result<Arc<dyn RequesterFactory>, BackendError> {
    Err(BackendError::NotCompiled(Backend::Kafka))
}

#[cfg(feature = "kafka")]
fn kafka_stream_benchmark(
    config: &BackendConfig,
) -> Result<Box<dyn StreamBenchmark>, BackendError> {
    Ok(Box::new(crate::kafka::KafkaBenchmark::new(config.clone())))
}

#[cfg(not(feature = "kafka"))]
fn kafka_stream_benchmark(
    _config: &BackendConfig,
) -> Result<Box<dyn StreamBenchmark>, BackendError> {
    Err(BackendError::NotCompiled(Backend::Kafka))
}
