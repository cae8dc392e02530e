use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub campaigns: usize,
    pub version: u64,
    pub captured_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health
/// Ready once a campaign snapshot has been published
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let snapshot = state
        .bids
        .current_snapshot()
        .ok_or_else(|| AppError::ServiceUnavailable("Campaign snapshot not loaded".to_string()))?;

    Ok(Json(HealthResponse {
        status: "ready",
        campaigns: snapshot.len(),
        version: snapshot.version(),
        captured_at: snapshot.captured_at(),
    }))
}
