//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::session::run_session;
use crate::app_state::AppState;
use crate::domain::ChannelId;
use crate::error::GatewayError;

/// Header carrying the authenticated principal.
pub const USER_EMAIL_HEADER: &str = "user-email";

/// Query parameters accepted by the upgrade endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Principal, used when the `User-Email` header is absent.
    pub user_email: Option<String>,
    /// Channel to join on connect.
    pub channel_id: Option<String>,
}

/// Resolves the principal from the `User-Email` header, falling back to
/// the `user_email` query parameter. Blank values count as missing.
#[must_use]
pub fn principal(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| query.map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// `GET /api/v1/ws` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] when no principal is supplied.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, GatewayError> {
    let user_email = principal(&headers, params.user_email.as_deref())
        .ok_or_else(|| GatewayError::Unauthorized("user email is required".to_string()))?;
    let channel_id = ChannelId::parse_optional(params.channel_id.as_deref());
    tracing::info!(
        user_email = %user_email,
        channel_id = ?channel_id.as_ref().map(ChannelId::as_str),
        "websocket upgrade"
    );

    let hub = state.hub.clone();
    let settings = state.session.clone();
    Ok(ws
        .max_message_size(settings.max_message_size)
        .on_upgrade(move |socket| run_session(socket, hub, user_email, channel_id, settings))
        .into_response())
}
