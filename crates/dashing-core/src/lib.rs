//! Dashing Core Library
//!
//! Event model, broker and job scheduler for the dashing push server.

pub mod broker;
pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;

pub use broker::{Broker, BrokerStats, Publisher, Subscription, SubscriptionId};
pub use config::{BrokerConfig, Config};
pub use error::{BrokerError, BrokerResult, ConfigError, SchedulerError};
pub use event::{Event, DASHBOARDS_TARGET};
pub use scheduler::{register_default_job, Job, Scheduler};
