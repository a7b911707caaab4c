//! HTTP layer: route handlers, DTOs, router composition and the OpenAPI
//! document.
//!
//! Gateway endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "chat-gateway", description = "WebSocket fan-out and stock-quote relay"),
    paths(handlers::system::health_handler, handlers::stats::stats_handler),
    components(schemas(
        dto::StatsResponse,
        dto::StatsDto,
        handlers::system::HealthResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "WebSocket", description = "Real-time connection hub"),
    )
)]
pub struct ApiDoc;

/// Builds the complete router with all HTTP and WebSocket endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
