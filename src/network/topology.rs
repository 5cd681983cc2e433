use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::TopologyError;
use crate::protocol::types::Latency;
use crate::{HostId, PortId};

/// Description of a network to simulate, as read from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub routers: Vec<String>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    pub latency: Latency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: HostId,
    pub router: String,
    pub latency: Latency,
}

/// What sits at the far end of a router port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Router { name: String, port: PortId },
    Host(HostId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub latency: Latency,
    pub peer: Endpoint,
    pub up: bool,
}

/// Port-level wiring derived from a `Topology`.
///
/// Ports are numbered from 1 per router: links first, in the order they are
/// listed, then attached hosts.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    ports: HashMap<(String, PortId), Attachment>,
    /// (router, port) pairs in the order they were allocated.
    order: Vec<(String, PortId)>,
}

impl Wiring {
    fn insert(&mut self, router: &str, port: PortId, latency: Latency, peer: Endpoint) {
        let key = (router.to_string(), port);
        self.order.push(key.clone());
        self.ports.insert(key, Attachment { latency, peer, up: true });
    }

    pub fn attachment(&self, router: &str, port: PortId) -> Option<&Attachment> {
        self.ports.get(&(router.to_string(), port))
    }

    pub fn ports_in_order(&self) -> &[(String, PortId)] {
        &self.order
    }

    /// Router-side port of `host`.
    pub fn host_port(&self, host: &str) -> Option<(String, PortId)> {
        self.order
            .iter()
            .find(|key| matches!(&self.ports[*key].peer, Endpoint::Host(h) if h == host))
            .cloned()
    }

    /// Both ends of the first link between `a` and `b`, seen from `a`.
    pub fn link_ports(&self, a: &str, b: &str) -> Option<(PortId, PortId)> {
        self.order.iter().find_map(|(router, port)| {
            if router != a {
                return None;
            }
            match &self.ports[&(router.clone(), *port)].peer {
                Endpoint::Router { name, port: peer_port } if name == b => Some((*port, *peer_port)),
                _ => None,
            }
        })
    }

    pub fn set_link_state(&mut self, a: &str, a_port: PortId, b: &str, b_port: PortId, up: bool) {
        for key in [(a.to_string(), a_port), (b.to_string(), b_port)] {
            if let Some(attachment) = self.ports.get_mut(&key) {
                attachment.up = up;
            }
        }
    }
}

impl Topology {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let topology: Topology = serde_json::from_str(&content)?;
        Ok(topology)
    }

    /// Checks names and references, then allocates ports.
    pub fn wiring(&self) -> Result<Wiring, TopologyError> {
        let mut names = HashSet::new();
        for name in self.routers.iter().chain(self.hosts.iter().map(|h| &h.name)) {
            if !names.insert(name.as_str()) {
                return Err(TopologyError::DuplicateName(name.clone()));
            }
        }

        let routers: HashSet<&str> = self.routers.iter().map(String::as_str).collect();
        let mut next_port: HashMap<&str, PortId> = HashMap::new();
        let mut allocate = |router: &str| -> Result<PortId, TopologyError> {
            let Some(name) = routers.get(router) else {
                return Err(TopologyError::UnknownRouter(router.to_string()));
            };
            let counter = next_port.entry(*name).or_insert(1);
            let port = *counter;
            *counter += 1;
            Ok(port)
        };

        let mut wiring = Wiring::default();

        for link in &self.links {
            let a_port = allocate(link.a.as_str())?;
            let b_port = allocate(link.b.as_str())?;
            wiring.insert(&link.a, a_port, link.latency, Endpoint::Router { name: link.b.clone(), port: b_port });
            wiring.insert(&link.b, b_port, link.latency, Endpoint::Router { name: link.a.clone(), port: a_port });
        }

        for host in &self.hosts {
            let port = allocate(host.router.as_str())?;
            wiring.insert(&host.router, port, host.latency, Endpoint::Host(host.name.clone()));
        }

        Ok(wiring)
    }
}
