use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::types::{DataPacket, Latency};
use crate::{HostId, PortId};

/// Outbound primitives a router uses to reach its neighbors.
pub trait Transport: Send {
    fn send_route(&mut self, port: PortId, destination: &str, latency: Latency);
    fn send_packet(&mut self, port: PortId, packet: DataPacket);
}

/// What a router puts on a wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Route { destination: HostId, latency: Latency },
    Data(DataPacket),
}

/// A payload leaving `router` through its local `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub router: String,
    pub port: PortId,
    pub payload: Payload,
}

/// Transport that hands every frame to the link fabric over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    router: String,
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelTransport {
    pub fn new(router: impl Into<String>, tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            router: router.into(),
            tx,
        }
    }

    fn emit(&self, port: PortId, payload: Payload) {
        let frame = Frame {
            router: self.router.clone(),
            port,
            payload,
        };
        if self.tx.send(frame).is_err() {
            warn!("{}: link fabric is gone, dropping frame on port {}", self.router, port);
        }
    }
}

impl Transport for ChannelTransport {
    fn send_route(&mut self, port: PortId, destination: &str, latency: Latency) {
        self.emit(
            port,
            Payload::Route {
                destination: destination.to_string(),
                latency,
            },
        );
    }

    fn send_packet(&mut self, port: PortId, packet: DataPacket) {
        self.emit(port, Payload::Data(packet));
    }
}

/// Keeps everything sent, in order. Test helper.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    pub routes: Vec<(PortId, HostId, Latency)>,
    pub packets: Vec<(PortId, DataPacket)>,
}

impl RecordingTransport {
    pub fn clear(&mut self) {
        self.routes.clear();
        self.packets.clear();
    }

    /// Routes sent on `port`, sorted by destination.
    pub fn routes_on(&self, port: PortId) -> Vec<(HostId, Latency)> {
        let mut sent: Vec<(HostId, Latency)> = self
            .routes
            .iter()
            .filter(|(p, _, _)| *p == port)
            .map(|(_, dst, latency)| (dst.clone(), *latency))
            .collect();
        sent.sort();
        sent
    }
}

impl Transport for RecordingTransport {
    fn send_route(&mut self, port: PortId, destination: &str, latency: Latency) {
        self.routes.push((port, destination.to_string(), latency));
    }

    fn send_packet(&mut self, port: PortId, packet: DataPacket) {
        self.packets.push((port, packet));
    }
}
