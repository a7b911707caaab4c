//! WebSocket hub statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::StatsResponse;
use crate::app_state::AppState;

/// `GET /ws/stats` — Connection and channel membership counts.
#[utoipa::path(
    get,
    path = "/api/v1/ws/stats",
    tag = "WebSocket",
    summary = "WebSocket hub statistics",
    description = "Returns the number of connected clients, member counts per channel, and the dropped-broadcast and eviction counters. Served without entering the hub's command queue.",
    responses(
        (status = 200, description = "Current hub statistics", body = StatsResponse),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.hub.stats().await;
    (StatusCode::OK, Json(StatsResponse::from(stats)))
}

/// Stats routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/stats", get(stats_handler))
}
