//! Configuration for the prediction client
//!
//! Every setting is a plain value handed to the client's constructor. Nothing
//! is read from the process environment, and there is no built-in server
//! address.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PredictError, Result};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base address of the prediction server, e.g. `http://localhost:8000`
    pub base_url: String,

    /// Deadline applied to every network attempt
    pub timeout: Duration,

    /// Retry configuration
    pub retry: RetryConfig,

    /// Defaults for bulk runs
    pub bulk: BulkDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
            bulk: BulkDefaults::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PredictError::config("base_url must be set"));
        }
        if self.timeout.is_zero() {
            return Err(PredictError::config("timeout must be greater than zero"));
        }
        if self.bulk.batch_size == 0 {
            return Err(PredictError::config("batch_size must be at least 1"));
        }
        self.retry.validate()
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f32,

    /// Add up to 30% random extra delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PredictError::config(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Batch size and concurrency used when a bulk run does not override them
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkDefaults {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for BulkDefaults {
    fn default() -> Self {
        Self {
            batch_size: 200,
            concurrency: 8,
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: ClientConfig,
}

impl ConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn backoff(mut self, initial_delay: Duration, multiplier: f32) -> Self {
        self.config.retry.initial_delay = initial_delay;
        self.config.retry.backoff_multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.retry.jitter = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.bulk.batch_size = size;
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.config.bulk.concurrency = limit;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Load configuration from a TOML file
pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PredictError::config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config: ClientConfig = toml::from_str(&contents)
        .map_err(|e| PredictError::config(format!("invalid config {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
