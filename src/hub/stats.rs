//! Channel membership index and the read-only statistics view over it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::{ChannelId, ConnectionId};

/// Channel → member set, plus the total connection count.
///
/// Only the hub actor writes to it. A channel key exists if and only if
/// its member set is non-empty.
#[derive(Debug, Default)]
pub(crate) struct MembershipIndex {
    channels: HashMap<ChannelId, HashSet<ConnectionId>>,
    total_connections: usize,
}

impl MembershipIndex {
    pub(crate) fn set_total(&mut self, total: usize) {
        self.total_connections = total;
    }

    pub(crate) fn insert(&mut self, channel_id: ChannelId, connection_id: ConnectionId) {
        self.channels
            .entry(channel_id)
            .or_default()
            .insert(connection_id);
    }

    /// Removes a member, pruning the channel entry once it is empty.
    pub(crate) fn remove(&mut self, channel_id: &ChannelId, connection_id: ConnectionId) -> bool {
        let Some(members) = self.channels.get_mut(channel_id) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.channels.remove(channel_id);
        }
        removed
    }

    pub(crate) fn members(&self, channel_id: &ChannelId) -> Vec<ConnectionId> {
        self.channels
            .get(channel_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn snapshot(&self, counters: &HubCounters) -> HubStats {
        HubStats {
            total_connections: self.total_connections,
            channels: self
                .channels
                .iter()
                .map(|(id, members)| (id.clone(), members.len()))
                .collect(),
            dropped_broadcasts: counters.dropped_broadcasts.load(Ordering::Relaxed),
            evicted_connections: counters.evicted_connections.load(Ordering::Relaxed),
        }
    }
}

/// Monotonic counters for dropped and evicted traffic.
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    pub(crate) dropped_broadcasts: AtomicU64,
    pub(crate) evicted_connections: AtomicU64,
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Number of registered connections.
    pub total_connections: usize,
    /// Member count per non-empty channel.
    pub channels: BTreeMap<ChannelId, usize>,
    /// `broadcast_all` events dropped because the hub queue was full.
    pub dropped_broadcasts: u64,
    /// Connections evicted for not draining their mailbox.
    pub evicted_connections: u64,
}

impl HubStats {
    /// Returns the member count of `channel_id` (0 when absent).
    #[must_use]
    pub fn channel_count(&self, channel_id: &ChannelId) -> usize {
        self.channels.get(channel_id).copied().unwrap_or(0)
    }
}
