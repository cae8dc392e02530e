use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Raw query parameters. Kept as strings so that a non-numeric value is a
/// "no bid" answer rather than an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct BidQuery {
    pub publisherid: Option<String>,
    pub position: Option<String>,
}

impl BidQuery {
    /// `(position, publisher_id)` when both are present and integral.
    pub fn parse(&self) -> Option<(i64, i64)> {
        let publisher_id = self.publisherid.as_deref()?.trim().parse().ok()?;
        let position = self.position.as_deref()?.trim().parse().ok()?;
        Some((position, publisher_id))
    }
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    pub price: f64,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bid", get(best_bid))
        .route("/bid/live", get(best_bid_live))
}

/// GET /bid?publisherid=..&position=..
/// Best price over the cached campaign snapshot
pub async fn best_bid(State(state): State<AppState>, Query(query): Query<BidQuery>) -> Response {
    let Some((position, publisher_id)) = query.parse() else {
        debug!(?query, "Ignoring bid request with invalid parameters");
        return StatusCode::NO_CONTENT.into_response();
    };

    price_response(state.bids.best_bid(position, publisher_id).await)
}

/// GET /bid/live?publisherid=..&position=..
/// Same contract, evaluated against the store one campaign at a time
pub async fn best_bid_live(State(state): State<AppState>, Query(query): Query<BidQuery>) -> Response {
    let Some((position, publisher_id)) = query.parse() else {
        debug!(?query, "Ignoring bid request with invalid parameters");
        return StatusCode::NO_CONTENT.into_response();
    };

    price_response(state.bids.best_bid_streaming(position, publisher_id).await)
}

fn price_response(price: f64) -> Response {
    if price == 0.0 {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::OK, Json(BidResponse { price })).into_response()
    }
}
