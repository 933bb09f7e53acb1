//! Application state.

use dashing_core::{Broker, Config};
use std::path::Path;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: Broker,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(broker: Broker, config: Arc<Config>) -> Self {
        Self { broker, config }
    }

    /// Root directory for dashboards, widgets and static assets.
    pub fn webroot(&self) -> &Path {
        &self.config.webroot
    }

    pub fn development(&self) -> bool {
        self.config.development
    }
}
