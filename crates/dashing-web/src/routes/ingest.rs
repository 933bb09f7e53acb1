//! Event ingestion endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use dashing_core::{BrokerError, Event};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Parse a request body as a JSON object, whatever the content type.
fn parse_body(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn publish(state: &AppState, event: Event) -> Result<StatusCode, ApiError> {
    debug!(event_id = %event.id, target = %event.target, "Publishing ingested event");
    state.broker.publish(event).await.map_err(|e| match e {
        BrokerError::Closed | BrokerError::Full => ApiError::Unavailable(e.to_string()),
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /dashboards/{id} - Push a dashboard-scoped event.
pub async fn dashboard_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let data = parse_body(&body)?;
    publish(&state, Event::dashboard(id, data)).await
}

/// POST /widgets/{id} - Push data to a widget.
pub async fn widget_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let data = parse_body(&body)?;
    publish(&state, Event::widget(id, data)).await
}
