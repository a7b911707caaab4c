//! chat-gateway server entry point.
//!
//! Starts the hub, the quote pipeline consumers and the Axum HTTP server
//! with the WebSocket endpoint.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chat_gateway::api;
use chat_gateway::app_state::AppState;
use chat_gateway::bot::{CommandDispatcher, ResponseRelay, StooqQuoteProvider};
use chat_gateway::config::GatewayConfig;
use chat_gateway::hub::Hub;
use chat_gateway::queue;
use chat_gateway::service::CommandIntake;
use chat_gateway::ws::SessionSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env().context("failed to load configuration")?;
    tracing::info!(
        addr = %config.listen_addr,
        queue_backend = ?config.queue_backend,
        "starting chat-gateway"
    );

    // Durable queues; unreachable storage is fatal
    let queues = queue::build_queues(&config)
        .await
        .context("failed to open pipeline queues")?;

    // Connection registry
    let hub = Hub::spawn(config.hub_queue_capacity);
    let app_state = AppState::new(
        hub,
        CommandIntake::new(Arc::clone(&queues.commands)),
        SessionSettings::from(&config),
    );

    // Quote pipeline
    let provider = StooqQuoteProvider::new(&config.quote_api_url, config.quote_timeout())
        .context("failed to build quote provider")?;
    let _dispatcher = CommandDispatcher::new(
        Arc::clone(&queues.commands),
        Arc::clone(&queues.replies),
        Arc::new(provider),
        config.bot_name.as_str(),
        config.quote_timeout(),
    )
    .with_retry_delay(config.queue_poll_interval())
    .spawn();
    let _relay = ResponseRelay::new(Arc::clone(&queues.replies), app_state.gateway.clone())
        .with_retry_delay(config.queue_poll_interval())
        .spawn();

    // Build router
    let app: Router = api::build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
