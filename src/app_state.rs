//! Shared application state injected into all Axum handlers.

use crate::hub::Hub;
use crate::service::{BroadcastGateway, CommandIntake};
use crate::ws::SessionSettings;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Connection registry.
    pub hub: Hub,
    /// Message event fan-out for the CRUD layer.
    pub gateway: BroadcastGateway,
    /// Quote command intake for the CRUD layer.
    pub intake: CommandIntake,
    /// Limits applied to new WebSocket sessions.
    pub session: SessionSettings,
}

impl AppState {
    /// Assembles the state around `hub`.
    #[must_use]
    pub fn new(hub: Hub, intake: CommandIntake, session: SessionSettings) -> Self {
        Self {
            gateway: BroadcastGateway::new(hub.clone()),
            hub,
            intake,
            session,
        }
    }
}
