//! Health endpoint.

use axum::{extract::State, Json};
use dashing_core::BrokerStats;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /healthz - Broker counters.
pub async fn healthz(State(state): State<AppState>) -> Result<Json<BrokerStats>, ApiError> {
    let stats = state
        .broker
        .stats()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(stats))
}
