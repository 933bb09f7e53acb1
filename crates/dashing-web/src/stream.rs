//! Server-Sent Events delivery to connected viewers.
//!
//! Each `GET /events` request subscribes to the broker and streams every
//! event as one SSE frame:
//!
//! ```text
//! event: dashboards        (only when the event has a target)
//! data: {"id":"w1","updatedAt":1700000000,"value":1}
//!
//! ```
//!
//! When the viewer disconnects hyper drops the response body, which drops
//! the subscription and unsubscribes it.

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{self, KeepAlive, Sse},
        IntoResponse,
    },
};
use dashing_core::Event;
use futures::stream::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event target must not contain line breaks: {0:?}")]
    InvalidTarget(String),
}

/// A rendered, ready-to-send SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub target: Option<String>,
    pub data: String,
}

impl Frame {
    /// Wire text of the frame, including the terminating blank line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(target) = &self.target {
            out.push_str("event: ");
            out.push_str(target);
            out.push('\n');
        }
        out.push_str("data: ");
        out.push_str(&self.data);
        out.push_str("\n\n");
        out
    }

    pub fn into_sse(self) -> sse::Event {
        let event = sse::Event::default();
        let event = match self.target {
            Some(target) => event.event(target),
            None => event,
        };
        event.data(self.data)
    }
}

/// Render an event for delivery.
///
/// The body is copied and augmented with `id` and `updatedAt` (unix
/// seconds), overwriting any keys of the same name.
pub fn render_frame(event: &Event, updated_at: i64) -> Result<Frame, FrameError> {
    let target = if event.target.is_empty() {
        None
    } else if event.target.contains(['\n', '\r']) {
        return Err(FrameError::InvalidTarget(event.target.clone()));
    } else {
        Some(event.target.clone())
    };

    let mut body = event.body.clone();
    body.insert("id".to_string(), Value::String(event.id.clone()));
    body.insert("updatedAt".to_string(), Value::from(updated_at));
    let data = serde_json::to_string(&body)?;

    Ok(Frame { target, data })
}

/// GET /events - Stream events to a viewer until it disconnects.
pub async fn events_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .broker
        .subscribe()
        .await
        .map_err(|e| ApiError::Internal(format!("streaming unavailable: {e}")))?;

    info!(subscription = %subscription.id(), "Viewer connected");

    let frames = subscription.filter_map(|event| async move {
        match render_frame(&event, chrono::Utc::now().timestamp()) {
            Ok(frame) => Some(Ok::<_, Infallible>(frame.into_sse())),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Skipping event that failed to render");
                None
            }
        }
    });

    let headers = [
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];

    Ok((headers, Sse::new(frames).keep_alive(KeepAlive::default())))
}
