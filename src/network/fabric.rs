//! In-process link fabric.
//!
//! Plays the part of the physical network: every router runs on its own task
//! and hands outgoing frames to the fabric, which looks up what is wired to
//! the sending port and delivers the frame there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::topology::{Endpoint, Topology, Wiring};
use crate::config::ProtocolSettings;
use crate::error::TopologyError;
use crate::protocol::task_manager::spawn_router;
use crate::protocol::{
    ChannelTransport, DataPacket, DvRouter, Frame, Payload, RouterEvent, RouterHandle,
    TableEntrySnapshot, TokioClock,
};
use crate::{HostId, PortId};

/// A data packet that reached the host it was addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub host: HostId,
    pub packet: DataPacket,
    pub received_at: DateTime<Utc>,
}

type SharedWiring = Arc<RwLock<Wiring>>;
type RouterMap = Arc<HashMap<String, RouterHandle>>;

pub struct Network {
    routers: RouterMap,
    wiring: SharedWiring,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Network {
    /// Spawns one task per router plus the fabric, then raises link-up for
    /// every wired port and attaches hosts.
    pub fn start(topology: &Topology, settings: ProtocolSettings) -> Result<Self, TopologyError> {
        let wiring = topology.wiring()?;
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        let mut routers = HashMap::new();
        for name in &topology.routers {
            let router = DvRouter::new(
                name.clone(),
                settings.clone(),
                TokioClock,
                ChannelTransport::new(name.clone(), frame_tx.clone()),
            );
            let (handle, task) = spawn_router(router, shutdown_tx.subscribe());
            routers.insert(name.clone(), handle);
            tasks.push(task);
        }
        drop(frame_tx);

        let mut network = Self {
            routers: Arc::new(routers),
            wiring: Arc::new(RwLock::new(wiring.clone())),
            deliveries: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx,
            tasks,
        };

        let fabric = tokio::spawn(run_fabric(
            frame_rx,
            network.wiring.clone(),
            network.routers.clone(),
            network.deliveries.clone(),
            network.shutdown_tx.subscribe(),
        ));

        for (router, port) in wiring.ports_in_order() {
            let Some(attachment) = wiring.attachment(router, *port) else {
                continue;
            };
            let handle = network.router(router)?;
            handle.send(RouterEvent::LinkUp {
                port: *port,
                latency: attachment.latency,
            })?;
            if let Endpoint::Host(host) = &attachment.peer {
                handle.send(RouterEvent::StaticRoute {
                    host: host.clone(),
                    port: *port,
                })?;
            }
        }

        info!(
            "Network started: {} routers, {} ports",
            network.routers.len(),
            wiring.ports_in_order().len()
        );

        network.tasks.push(fabric);
        Ok(network)
    }

    fn router(&self, name: &str) -> Result<&RouterHandle, TopologyError> {
        self.routers
            .get(name)
            .ok_or_else(|| TopologyError::UnknownRouter(name.to_string()))
    }

    pub fn router_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Takes the link between routers `a` and `b` down on both ends.
    pub async fn link_down(&self, a: &str, b: &str) -> Result<(), TopologyError> {
        let (a_port, b_port) = self.set_link(a, b, false).await?;
        info!("Link {}:{} <-> {}:{} down", a, a_port, b, b_port);
        self.router(a)?.send(RouterEvent::LinkDown { port: a_port })?;
        self.router(b)?.send(RouterEvent::LinkDown { port: b_port })?;
        Ok(())
    }

    /// Brings a previously failed link back up.
    pub async fn link_up(&self, a: &str, b: &str) -> Result<(), TopologyError> {
        let (a_port, b_port) = self.set_link(a, b, true).await?;
        let latency = {
            let wiring = self.wiring.read().await;
            wiring
                .attachment(a, a_port)
                .map(|attachment| attachment.latency)
                .ok_or_else(|| TopologyError::NoSuchLink(a.to_string(), b.to_string()))?
        };
        info!("Link {}:{} <-> {}:{} up", a, a_port, b, b_port);
        self.router(a)?.send(RouterEvent::LinkUp { port: a_port, latency })?;
        self.router(b)?.send(RouterEvent::LinkUp { port: b_port, latency })?;
        Ok(())
    }

    async fn set_link(&self, a: &str, b: &str, up: bool) -> Result<(PortId, PortId), TopologyError> {
        self.router(a)?;
        self.router(b)?;

        let mut wiring = self.wiring.write().await;
        let (a_port, b_port) = wiring
            .link_ports(a, b)
            .ok_or_else(|| TopologyError::NoSuchLink(a.to_string(), b.to_string()))?;

        let currently_up = wiring.attachment(a, a_port).is_some_and(|attachment| attachment.up);
        if up && currently_up {
            return Err(TopologyError::LinkAlreadyUp(a.to_string(), b.to_string()));
        }

        wiring.set_link_state(a, a_port, b, b_port, up);
        Ok((a_port, b_port))
    }

    /// Injects a packet from host `src` into its router.
    pub async fn send_packet(&self, src: &str, dst: &str, payload: &str) -> Result<(), TopologyError> {
        let (router, port) = self
            .wiring
            .read()
            .await
            .host_port(src)
            .ok_or_else(|| TopologyError::UnknownHost(src.to_string()))?;

        debug!("Host {} sends packet to {} via {}:{}", src, dst, router, port);
        self.router(&router)?.send(RouterEvent::Data {
            packet: DataPacket::new(src, dst, payload),
            port,
        })
    }

    pub async fn routing_table(&self, router: &str) -> Result<Vec<TableEntrySnapshot>, TopologyError> {
        self.router(router)?.snapshot().await
    }

    pub async fn routing_tables(&self) -> Result<BTreeMap<String, Vec<TableEntrySnapshot>>, TopologyError> {
        let mut tables = BTreeMap::new();
        for name in self.router_names() {
            let table = self.routing_table(&name).await?;
            tables.insert(name, table);
        }
        Ok(tables)
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Network stopped");
    }
}

async fn run_fabric(
    mut frames: mpsc::UnboundedReceiver<Frame>,
    wiring: SharedWiring,
    routers: RouterMap,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Link fabric shutting down");
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                deliver(frame, &wiring, &routers, &deliveries).await;
            }
        }
    }
}

async fn deliver(
    frame: Frame,
    wiring: &SharedWiring,
    routers: &RouterMap,
    deliveries: &Arc<Mutex<Vec<Delivery>>>,
) {
    let peer = {
        let wiring = wiring.read().await;
        match wiring.attachment(&frame.router, frame.port) {
            Some(attachment) if attachment.up => attachment.peer.clone(),
            Some(_) => {
                debug!("{}:{} is down, dropping frame", frame.router, frame.port);
                return;
            }
            None => {
                warn!("{}:{} is not wired, dropping frame", frame.router, frame.port);
                return;
            }
        }
    };

    match (peer, frame.payload) {
        (Endpoint::Router { name, port }, payload) => {
            let Some(handle) = routers.get(&name) else {
                warn!("Frame for unknown router {}", name);
                return;
            };
            let event = match payload {
                Payload::Route { destination, latency } => RouterEvent::Advertisement {
                    destination,
                    latency,
                    port,
                },
                Payload::Data(packet) => RouterEvent::Data { packet, port },
            };
            if let Err(e) = handle.send(event) {
                warn!("Failed to deliver frame: {}", e);
            }
        }
        (Endpoint::Host(host), Payload::Data(packet)) => {
            if packet.dst != host {
                debug!("Host {} discards packet for {}", host, packet.dst);
                return;
            }
            info!("Host {} received packet from {}", host, packet.src);
            deliveries.lock().await.push(Delivery {
                host,
                packet,
                received_at: Utc::now(),
            });
        }
        // Hosts do not take part in routing.
        (Endpoint::Host(_), Payload::Route { .. }) => {}
    }
}
