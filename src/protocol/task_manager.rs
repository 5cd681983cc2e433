use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::routing_table::TableEntrySnapshot;
use super::transport::Transport;
use super::types::{DataPacket, Latency};
use super::DvRouter;
use crate::error::TopologyError;
use crate::{HostId, PortId};

/// Everything the outside world can tell a router.
#[derive(Debug)]
pub enum RouterEvent {
    LinkUp { port: PortId, latency: Latency },
    LinkDown { port: PortId },
    StaticRoute { host: HostId, port: PortId },
    Advertisement { destination: HostId, latency: Latency, port: PortId },
    Data { packet: DataPacket, port: PortId },
    Snapshot(oneshot::Sender<Vec<TableEntrySnapshot>>),
}

/// Cheap, cloneable way to deliver events to a running router task.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    name: String,
    tx: mpsc::UnboundedSender<RouterEvent>,
}

impl RouterHandle {
    pub fn send(&self, event: RouterEvent) -> Result<(), TopologyError> {
        self.tx
            .send(event)
            .map_err(|_| TopologyError::RouterGone(self.name.clone()))
    }

    pub async fn snapshot(&self) -> Result<Vec<TableEntrySnapshot>, TopologyError> {
        let (tx, rx) = oneshot::channel();
        self.send(RouterEvent::Snapshot(tx))?;
        rx.await.map_err(|_| TopologyError::RouterGone(self.name.clone()))
    }
}

/// Starts `router` on its own task.
///
/// Events and timer ticks are handled strictly one at a time, so the routing
/// table is never seen half-updated. The task ends on shutdown or once every
/// handle has been dropped.
pub fn spawn_router<T: Transport + 'static>(
    router: DvRouter<T>,
    shutdown_rx: broadcast::Receiver<()>,
) -> (RouterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RouterHandle {
        name: router.name().to_string(),
        tx,
    };

    let task = tokio::spawn(async move {
        router_task(router, rx, shutdown_rx).await;
    });

    (handle, task)
}

async fn router_task<T: Transport>(
    mut router: DvRouter<T>,
    mut events: mpsc::UnboundedReceiver<RouterEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut timer = interval(router.settings().timer_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Router {} started (policy: {:?})", router.name(), router.settings().policy);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Router {} shutting down", router.name());
                break;
            }
            _ = timer.tick() => {
                router.handle_timer();
            }
            event = events.recv() => {
                match event {
                    Some(event) => dispatch(&mut router, event),
                    None => {
                        debug!("Router {} has no more handles, stopping", router.name());
                        break;
                    }
                }
            }
        }
    }
}

fn dispatch<T: Transport>(router: &mut DvRouter<T>, event: RouterEvent) {
    match event {
        RouterEvent::LinkUp { port, latency } => router.handle_link_up(port, latency),
        RouterEvent::LinkDown { port } => router.handle_link_down(port),
        RouterEvent::StaticRoute { host, port } => router.add_static_route(&host, port),
        RouterEvent::Advertisement { destination, latency, port } => {
            router.handle_route_advertisement(&destination, latency, port)
        }
        RouterEvent::Data { packet, port } => router.handle_data_packet(packet, port),
        RouterEvent::Snapshot(reply) => {
            if reply.send(router.snapshot()).is_err() {
                error!("Router {}: snapshot requester went away", router.name());
            }
        }
    }
}
