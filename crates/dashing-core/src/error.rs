//! Centralized error types for dashing.

use thiserror::Error;

/// Errors returned by the broker handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker is closed: the dispatch task has stopped")]
    Closed,

    #[error("Broker publish queue is full")]
    Full,
}

/// Errors raised while building a scheduler's job set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid settings for job '{job}': {source}")]
    JobSettings {
        job: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl ConfigError {
    /// Create an invalid configuration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

impl SchedulerError {
    /// Create an invalid job error.
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }
}
