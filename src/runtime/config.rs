//! Queue configuration and TOML loading.

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::NetworkStatus;

use super::backoff::Backoff;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "mutqueue_offline_queue";

/// Errors loading a [`QueueConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// TOML syntax or schema error.
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Values parsed but violate a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Options recognized by [`crate::runtime::handle::MutationQueue::spawn`].
///
/// ```toml
/// max_retries = 5
/// process_interval = "10s"
/// storage_key = "tasks_offline_queue"
///
/// [backoff]
/// strategy = "exponential"
/// base = "1s"
/// max = "2m"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Failed attempts after which a mutation is dropped.
    pub max_retries: NonZeroU32,
    /// Advisory period for host-driven drain triggers. The queue never
    /// schedules timers on its own.
    #[serde(with = "humantime_serde")]
    pub process_interval: Duration,
    /// Single key the queue state is persisted under.
    pub storage_key: String,
    /// Connectivity assumed until the host reports otherwise.
    pub initial_network: NetworkStatus,
    /// Delay before a failed head may be attempted again.
    pub backoff: Backoff,
    /// Buffer size of the event broadcast channel.
    pub events_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            process_interval: Duration::from_millis(5000),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            initial_network: NetworkStatus::Online,
            backoff: Backoff::None,
            events_capacity: 256,
        }
    }
}

impl QueueConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_key must not be empty".to_string()));
        }
        if self.events_capacity == 0 {
            return Err(ConfigError::Invalid("events_capacity must be positive".to_string()));
        }
        if self.process_interval.is_zero() {
            return Err(ConfigError::Invalid("process_interval must be positive".to_string()));
        }
        self.backoff.validate().map_err(ConfigError::Invalid)
    }

    /// Replaces every value `validate` would reject with its default.
    pub(crate) fn repaired(mut self) -> Self {
        let defaults = Self::default();
        if self.storage_key.trim().is_empty() {
            self.storage_key = defaults.storage_key;
        }
        if self.events_capacity == 0 {
            self.events_capacity = defaults.events_capacity;
        }
        if self.process_interval.is_zero() {
            self.process_interval = defaults.process_interval;
        }
        if self.backoff.validate().is_err() {
            self.backoff = defaults.backoff;
        }
        self
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries.get()
    }
}
