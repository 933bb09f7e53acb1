//! Events pushed to connected viewers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Routing tag for dashboard-scoped events.
pub const DASHBOARDS_TARGET: &str = "dashboards";

/// A unit of data flowing from a producer to every connected viewer.
///
/// Once handed to the broker an event is shared behind an `Arc` and is
/// never mutated; consumers that need to augment the body clone it first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-chosen identifier, usually the widget or dashboard id.
    pub id: String,
    /// Arbitrary JSON object delivered to the viewer.
    pub body: Map<String, Value>,
    /// Named stream for the frame; empty for widget-scoped events.
    #[serde(default)]
    pub target: String,
}

impl Event {
    pub fn new(id: impl Into<String>, body: Map<String, Value>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body,
            target: target.into(),
        }
    }

    /// Create a widget-scoped event (no named stream).
    pub fn widget(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self::new(id, body, String::new())
    }

    /// Create a dashboard-scoped event.
    pub fn dashboard(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self::new(id, body, DASHBOARDS_TARGET)
    }

    pub fn is_dashboard_scoped(&self) -> bool {
        !self.target.is_empty()
    }
}
