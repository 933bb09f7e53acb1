//! Server configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file
//! (or no file at all) yields a usable configuration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Broker buffer sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Events buffered per viewer before new events are dropped for it.
    pub subscriber_buffer: usize,
    /// Events queued between producers and the dispatcher.
    pub publish_queue: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            publish_queue: 256,
        }
    }
}

/// Process-wide configuration, shared read-only with every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: SocketAddr,
    /// Directory holding `dashboards/`, `widgets/` and `public/`.
    pub webroot: PathBuf,
    pub development: bool,
    pub broker: BrokerConfig,
    /// Free-form settings keyed by job name.
    pub jobs: toml::Table,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            webroot: PathBuf::from("."),
            development: false,
            broker: BrokerConfig::default(),
            jobs: toml::Table::new(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.subscriber_buffer == 0 {
            return Err(ConfigError::invalid("broker.subscriber_buffer must be greater than 0"));
        }
        if self.broker.publish_queue == 0 {
            return Err(ConfigError::invalid("broker.publish_queue must be greater than 0"));
        }
        Ok(())
    }

    /// Deserialize the `[jobs.<name>]` table into a job's own settings type.
    ///
    /// Returns `Ok(None)` when the job has no section.
    pub fn job_settings<T: DeserializeOwned>(&self, job: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.jobs.get(job) else {
            return Ok(None);
        };
        value
            .clone()
            .try_into::<T>()
            .map(Some)
            .map_err(|source| ConfigError::JobSettings {
                job: job.to_string(),
                source,
            })
    }
}
