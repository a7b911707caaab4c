//! HTTP endpoint handlers.

pub mod stats;
pub mod system;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Composes all routes served under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .merge(stats::routes())
}
