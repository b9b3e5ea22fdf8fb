//! Backend selection and connection settings

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default topic used by both benchmark modes
pub const DEFAULT_TOPIC: &str = "benchmark";

/// Default client identifier
pub const DEFAULT_CLIENT_ID: &str = "benchmark";

/// Backend setup and configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A required configuration field is missing or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The backend exists but this build does not include it
    #[error("backend '{0}' is not compiled in; rebuild with `--features {0}`")]
    NotCompiled(Backend),

    /// The backend name is not known
    #[error("unknown backend: {0}")]
    Unknown(String),

    /// The backend client could not be created
    #[error("failed to create {backend} client: {message}")]
    Client {
        /// Backend that failed
        backend: Backend,
        /// Underlying error
        message: String,
    },
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Supported message backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// In-process broker, always available
    #[serde(rename = "memory")]
    Memory,
    /// Apache Kafka via librdkafka (cargo feature `kafka`)
    #[serde(rename = "kafka")]
    Kafka,
}

impl Backend {
    /// Identifier used on the command line and in output file names
    pub fn id(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Kafka => "kafka",
        }
    }

    /// Default broker address
    pub fn default_url(&self) -> &'static str {
        match self {
            Backend::Memory => "memory://local",
            Backend::Kafka => "localhost:9092",
        }
    }

    /// Whether this build can drive the backend
    pub fn is_compiled(&self) -> bool {
        match self {
            Backend::Memory => true,
            Backend::Kafka => cfg!(feature = "kafka"),
        }
    }

    /// Returns all known backends.
    pub fn all() -> &'static [Backend] {
        &[Backend::Memory, Backend::Kafka]
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Backend {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "inproc" => Ok(Backend::Memory),
            "kafka" => Ok(Backend::Kafka),
            _ => Err(BackendError::Unknown(s.to_string())),
        }
    }
}

// ============================================================================
// Backend Configuration
// ============================================================================

/// Connection settings shared by requesters and stream benchmarks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Target backend
    pub system: Backend,

    /// Broker address
    pub url: String,

    /// Topic (or subject) messages are published to
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Synthetic payload size in bytes
    pub payload_size: usize,

    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

impl BackendConfig {
    /// Config for `system` at its default address
    pub fn new(system: Backend, payload_size: usize) -> Self {
        Self {
            system,
            url: system.default_url().to_string(),
            topic: default_topic(),
            payload_size,
            client_id: default_client_id(),
        }
    }

    /// Set the broker address
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Topic a single latency requester talks on
    ///
    /// Each requester gets its own topic so replies are never shared
    /// between workers.
    pub fn requester_topic(&self, worker_index: usize) -> String {
        format!("{}-{}", self.topic, worker_index)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.url.is_empty() {
            return Err(BackendError::MissingField("url"));
        }
        if self.topic.is_empty() {
            return Err(BackendError::MissingField("topic"));
        }
        if self.client_id.is_empty() {
            return Err(BackendError::MissingField("client_id"));
        }
        if !self.system.is_compiled() {
            return Err(BackendError::NotCompiled(self.system));
        }
        Ok(())
    }
}
