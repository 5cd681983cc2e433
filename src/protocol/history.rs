use std::collections::HashMap;

use super::types::Latency;
use crate::{HostId, PortId};

/// Last latency advertised for each (destination, port) pair.
///
/// Only used to skip resending a value the neighbor already has. When
/// disabled it answers "send" for everything and remembers nothing.
#[derive(Debug, Clone, Default)]
pub struct AdvertisementHistory {
    enabled: bool,
    sent: HashMap<(HostId, PortId), Latency>,
}

impl AdvertisementHistory {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sent: HashMap::new(),
        }
    }

    /// Whether `latency` for `destination` still has to go out on `port`.
    pub fn needs_send(&self, destination: &str, port: PortId, latency: Latency, force: bool) -> bool {
        if force || !self.enabled {
            return true;
        }
        self.sent
            .get(&(destination.to_string(), port))
            .is_none_or(|last| *last != latency)
    }

    pub fn record(&mut self, destination: &str, port: PortId, latency: Latency) {
        if self.enabled {
            self.sent.insert((destination.to_string(), port), latency);
        }
    }

    /// Drops everything remembered for `port`.
    pub fn forget_port(&mut self, port: PortId) {
        self.sent.retain(|(_, p), _| *p != port);
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
