use std::collections::HashMap;

use crate::PortId;
use crate::protocol::types::Latency;

/// Ports whose link is currently up, with the link latency.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    ports: HashMap<PortId, Latency>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            ports: HashMap::new(),
        }
    }

    pub fn add_port(&mut self, port: PortId, latency: Latency) {
        self.ports.insert(port, latency);
    }

    pub fn remove_port(&mut self, port: PortId) -> Option<Latency> {
        self.ports.remove(&port)
    }

    pub fn get_latency(&self, port: PortId) -> Option<Latency> {
        self.ports.get(&port).copied()
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.ports.contains_key(&port)
    }

    /// Up ports in ascending order.
    pub fn get_all_ports(&self) -> Vec<PortId> {
        let mut ports: Vec<PortId> = self.ports.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
