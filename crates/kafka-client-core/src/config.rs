//! Configuration types for the Kafka client.
//!
//! Configuration is loaded from YAML files and validated before use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::network::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::protocol::packet::RESPONSE_HEADER_SIZE;

/// Root configuration for the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Seed brokers as `plaintext://host[:port]` URLs.
    ///
    /// Entries may reference environment variables as `${VAR}`.
    pub bootstrap_servers: Vec<String>,

    /// Topics to request metadata for.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Ask brokers to create missing topics.
    #[serde(default)]
    pub auto_create_topics: bool,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Largest inbound frame accepted, in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Retry of metadata requests that failed with a retryable error.
    #[serde(default)]
    pub metadata_retry: MetadataRetryConfig,

    /// How responses are matched to in-flight requests.
    #[serde(default)]
    pub correlation: CorrelationMode,

    /// Open connections to brokers learned from metadata.
    #[serde(default = "default_discover_brokers")]
    pub discover_brokers: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetadataRetryConfig {
    /// Retries allowed after the first request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; retry `n` waits `(n + 1) * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// Strategy for matching responses to pending requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMode {
    /// A response must answer the oldest in-flight request. Anything else
    /// is dropped and the request stays pending.
    #[default]
    Fifo,
    /// A response is matched to whichever in-flight request carries its
    /// correlation id.
    Keyed,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format (for production).
    #[serde(default)]
    pub json: bool,
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to the empty string.
fn expand_env_vars(s: &str) -> String {
    match Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re
            .replace_all(s, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_default()
            })
            .to_string(),
        Err(_) => s.to_string(),
    }
}

// Default value functions

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_discover_brokers() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    25
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for MetadataRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Configuration loading and validation

impl ClientConfig {
    /// Configuration with defaults for everything but the seed brokers.
    #[must_use]
    pub fn new(bootstrap_servers: Vec<String>) -> Self {
        Self {
            bootstrap_servers,
            topics: Vec::new(),
            auto_create_topics: false,
            connection_timeout_ms: default_connection_timeout_ms(),
            max_frame_size: default_max_frame_size(),
            metadata_retry: MetadataRetryConfig::default(),
            correlation: CorrelationMode::default(),
            discover_brokers: default_discover_brokers(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Bootstrap URLs are not checked here: a list without a usable entry
    /// is reported as an event when the client bootstraps.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a topic name is empty or longer than `i16::MAX` bytes
    /// - the retry backoff is zero
    /// - `max_frame_size` cannot hold a response header
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(topic) = self
            .topics
            .iter()
            .find(|t| t.is_empty() || t.len() > i16::MAX as usize)
        {
            return Err(ConfigError::InvalidTopicName(topic.clone()));
        }

        if self.metadata_retry.backoff_ms == 0 {
            return Err(ConfigError::ZeroRetryBackoff);
        }

        if self.max_frame_size < RESPONSE_HEADER_SIZE {
            return Err(ConfigError::FrameSizeTooSmall(self.max_frame_size));
        }

        Ok(())
    }

    /// Bootstrap servers with environment variables expanded.
    #[must_use]
    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.bootstrap_servers
            .iter()
            .map(|s| expand_env_vars(s))
            .collect()
    }

    /// Connection timeout as a `Duration`.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl MetadataRetryConfig {
    /// Base backoff as a `Duration`.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
