use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;

use super::types::{Expiry, INFINITY, Latency};
use crate::{HostId, PortId};

/// One routing table row. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub destination: HostId,
    pub port: PortId,
    pub latency: Latency,
    pub expire_time: Expiry,
}

impl TableEntry {
    pub fn new(destination: HostId, port: PortId, latency: Latency, expire_time: Expiry) -> Self {
        Self {
            destination,
            port,
            latency,
            expire_time,
        }
    }

    /// Same destination and port, unreachable, with the given expiry.
    pub fn poisoned(&self, expire_time: Expiry) -> Self {
        Self {
            destination: self.destination.clone(),
            port: self.port,
            latency: INFINITY,
            expire_time,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !self.latency.is_infinite()
    }
}

/// Serializable view of a table entry, with expiry relative to a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntrySnapshot {
    pub destination: HostId,
    pub port: PortId,
    pub latency: Latency,
    /// `None` for static routes.
    pub expires_in_ms: Option<u64>,
}

/// Destination -> best known route. At most one entry per destination.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: HashMap<HostId, TableEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Installs `entry`, replacing whatever was there for its destination.
    pub fn install(&mut self, entry: TableEntry) -> Option<TableEntry> {
        self.entries.insert(entry.destination.clone(), entry)
    }

    pub fn remove(&mut self, destination: &str) -> Option<TableEntry> {
        self.entries.remove(destination)
    }

    pub fn get(&self, destination: &str) -> Option<&TableEntry> {
        self.entries.get(destination)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostId, &TableEntry)> {
        self.entries.iter()
    }

    pub fn destinations(&self) -> Vec<HostId> {
        self.entries.keys().cloned().collect()
    }

    /// Destinations currently routed out of `port`.
    pub fn routes_via(&self, port: PortId) -> Vec<HostId> {
        self.entries
            .values()
            .filter(|entry| entry.port == port)
            .map(|entry| entry.destination.clone())
            .collect()
    }

    pub fn snapshot(&self, now: Instant) -> Vec<TableEntrySnapshot> {
        let mut rows: Vec<TableEntrySnapshot> = self
            .entries
            .values()
            .map(|entry| TableEntrySnapshot {
                destination: entry.destination.clone(),
                port: entry.port,
                latency: entry.latency,
                expires_in_ms: match entry.expire_time {
                    Expiry::Forever => None,
                    Expiry::At(deadline) => {
                        Some(deadline.saturating_duration_since(now).as_millis() as u64)
                    }
                },
            })
            .collect();
        rows.sort_by(|a, b| a.destination.cmp(&b.destination));
        rows
    }
}
