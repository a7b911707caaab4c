//! Hub statistics response.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::hub::HubStats;

/// Envelope shared by the WebSocket stats endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Always `true` for a served response.
    pub success: bool,
    /// Statistics payload.
    pub data: StatsDto,
}

/// Connection and membership counts.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsDto {
    /// Number of registered connections.
    pub total_clients: usize,
    /// Member count per non-empty channel.
    pub channels: BTreeMap<String, usize>,
    /// Broadcasts dropped because the hub queue was saturated.
    pub dropped_broadcasts: u64,
    /// Connections evicted as slow consumers.
    pub evicted_connections: u64,
}

impl From<HubStats> for StatsDto {
    fn from(stats: HubStats) -> Self {
        Self {
            total_clients: stats.total_connections,
            channels: stats
                .channels
                .into_iter()
                .map(|(id, count)| (id.to_string(), count))
                .collect(),
            dropped_broadcasts: stats.dropped_broadcasts,
            evicted_connections: stats.evicted_connections,
        }
    }
}

impl From<HubStats> for StatsResponse {
    fn from(stats: HubStats) -> Self {
        Self {
            success: true,
            data: stats.into(),
        }
    }
}
