pub mod advertiser;
pub mod clock;
pub mod history;
pub mod routing_table;
pub mod task_manager;
pub mod transport;
pub mod types;

pub use clock::{Clock, ManualClock, TokioClock};
pub use history::AdvertisementHistory;
pub use routing_table::{RoutingTable, TableEntry, TableEntrySnapshot};
pub use task_manager::{RouterEvent, RouterHandle};
pub use transport::{ChannelTransport, Frame, Payload, RecordingTransport, Transport};
pub use types::{DataPacket, Expiry, FOREVER, INFINITY, Latency};

use log::{debug, info};

use crate::PortId;
use crate::config::ProtocolSettings;
use crate::network::PortRegistry;

/// A Distance Vector router.
///
/// Every handler runs to completion and owns the table exclusively while it
/// does, so callers must deliver events one at a time (see
/// [`task_manager`] for the event loop that does this).
pub struct DvRouter<T: Transport> {
    name: String,
    settings: ProtocolSettings,
    ports: PortRegistry,
    table: RoutingTable,
    history: AdvertisementHistory,
    clock: Box<dyn Clock>,
    transport: T,
}

impl<T: Transport> DvRouter<T> {
    pub fn new(
        name: impl Into<String>,
        settings: ProtocolSettings,
        clock: impl Clock + 'static,
        transport: T,
    ) -> Self {
        let history = AdvertisementHistory::new(settings.advertisement_history);
        Self {
            name: name.into(),
            settings,
            ports: PortRegistry::new(),
            table: RoutingTable::new(),
            history,
            clock: Box::new(clock),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn snapshot(&self) -> Vec<TableEntrySnapshot> {
        self.table.snapshot(self.clock.now())
    }

    fn fresh_expiry(&self) -> Expiry {
        Expiry::At(self.clock.now() + self.settings.route_ttl)
    }

    /// Installs a never-expiring route to a directly attached host.
    ///
    /// # Panics
    ///
    /// If `port` is not up. The framework attaches hosts only after raising
    /// link-up for their port, so this is a contract violation.
    pub fn add_static_route(&mut self, host: &str, port: PortId) {
        let latency = match self.ports.get_latency(port) {
            Some(latency) => latency,
            None => panic!("{}: link on port {} should be up, but is not", self.name, port),
        };

        info!("{}: static route to {} on port {} latency {}", self.name, host, port, latency);
        self.table
            .install(TableEntry::new(host.to_string(), port, latency, FOREVER));
    }

    /// Forwards `packet` along the current route, or drops it.
    pub fn handle_data_packet(&mut self, packet: DataPacket, in_port: PortId) {
        let Some(entry) = self.table.get(&packet.dst) else {
            debug!("{}: no route to {}, dropping packet", self.name, packet.dst);
            return;
        };

        if !entry.is_reachable() {
            debug!("{}: {} is unreachable, dropping packet", self.name, packet.dst);
            return;
        }

        if entry.port == in_port {
            debug!(
                "{}: route to {} points back out port {}, dropping packet",
                self.name, packet.dst, in_port
            );
            return;
        }

        let out_port = entry.port;
        debug!("{}: forwarding {} -> {} out port {}", self.name, packet.src, packet.dst, out_port);
        self.transport.send_packet(out_port, packet);
    }

    /// Processes a neighbor's claim that it reaches `destination` at `route_latency`.
    pub fn handle_route_advertisement(&mut self, destination: &str, route_latency: Latency, in_port: PortId) {
        let Some(link_latency) = self.ports.get_latency(in_port) else {
            debug!(
                "{}: advertisement for {} on port {} which is not up, ignoring",
                self.name, destination, in_port
            );
            return;
        };

        let candidate = link_latency.extend(route_latency);

        // Our next hop says it lost the route: poison ours and tell everyone now.
        if route_latency.is_infinite() {
            if let Some(current) = self.table.get(destination) {
                if current.port == in_port {
                    let poisoned = current.poisoned(current.expire_time);
                    info!(
                        "{}: next hop on port {} poisoned {}, poisoning our route",
                        self.name, in_port, destination
                    );
                    self.table.install(poisoned);
                    self.send_routes(true, None);
                    return;
                }
            }
        }

        let accept = match self.table.get(destination) {
            None => true,
            Some(current) => candidate < current.latency || current.port == in_port,
        };

        if !accept {
            debug!(
                "{}: ignoring {} latency {} from port {} (not better)",
                self.name, destination, candidate, in_port
            );
            return;
        }

        debug!(
            "{}: route to {} via port {} latency {}",
            self.name, destination, in_port, candidate
        );
        let entry = TableEntry::new(destination.to_string(), in_port, candidate, self.fresh_expiry());
        self.table.install(entry);
    }

    /// Advertises table entries to neighbors.
    ///
    /// With `force` every entry goes out; otherwise entries whose value on a
    /// port matches what was last sent there are skipped. `single_port`
    /// restricts the pass to that port.
    pub fn send_routes(&mut self, force: bool, single_port: Option<PortId>) {
        let ports = match single_port {
            Some(port) if self.ports.contains(port) => vec![port],
            Some(_) => Vec::new(),
            None => self.ports.get_all_ports(),
        };

        let mut entries: Vec<&TableEntry> = self.table.iter().map(|(_, entry)| entry).collect();
        entries.sort_by(|a, b| a.destination.cmp(&b.destination));

        let mut sent = 0usize;
        for port in ports {
            for entry in &entries {
                let Some(latency) = advertiser::advertised_latency(self.settings.policy, entry, port)
                else {
                    continue;
                };

                if !self.history.needs_send(&entry.destination, port, latency, force) {
                    continue;
                }

                self.transport.send_route(port, &entry.destination, latency);
                self.history.record(&entry.destination, port, latency);
                sent += 1;
            }
        }

        debug!("{}: sent {} advertisements (force: {})", self.name, sent, force);
    }

    /// Evicts or poisons routes whose TTL has passed.
    pub fn expire_routes(&mut self) {
        let now = self.clock.now();
        let ttl = self.settings.route_ttl;

        for destination in self.table.destinations() {
            let Some(entry) = self.table.get(&destination) else {
                continue;
            };

            if entry.expire_time == FOREVER || !entry.expire_time.is_expired(now) {
                continue;
            }

            if self.settings.poison_expired && entry.is_reachable() {
                info!("{}: route to {} expired, poisoning", self.name, destination);
                let poisoned = entry.poisoned(Expiry::At(now + ttl));
                self.table.install(poisoned);
            } else {
                info!("{}: route to {} expired, removing", self.name, destination);
                self.table.remove(&destination);
            }
        }
    }

    /// Periodic housekeeping: age out routes, then re-advertise everything.
    pub fn handle_timer(&mut self) {
        self.expire_routes();
        self.send_routes(true, None);
    }

    pub fn handle_link_up(&mut self, port: PortId, latency: Latency) {
        info!("{}: link up on port {} latency {}", self.name, port, latency);
        self.ports.add_port(port, latency);
        self.history.forget_port(port);

        if self.settings.send_on_link_up {
            self.send_routes(true, Some(port));
        }
    }

    pub fn handle_link_down(&mut self, port: PortId) {
        info!("{}: link down on port {}", self.name, port);
        self.ports.remove_port(port);
        self.history.forget_port(port);

        if !self.settings.poison_on_link_down {
            return;
        }

        let affected = self.table.routes_via(port);
        if affected.is_empty() {
            return;
        }

        let expiry = self.fresh_expiry();
        for destination in &affected {
            if let Some(entry) = self.table.get(destination) {
                let poisoned = entry.poisoned(expiry);
                self.table.install(poisoned);
            }
        }
        info!("{}: poisoned {} routes via port {}", self.name, affected.len(), port);

        self.send_routes(false, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdvertisementPolicy, RouterConfig};
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(15);

    fn router_with(config: RouterConfig) -> (DvRouter<RecordingTransport>, ManualClock) {
        let clock = ManualClock::new();
        let settings = config.validate().unwrap();
        let router = DvRouter::new("r1", settings, clock.clone(), RecordingTransport::default());
        (router, clock)
    }

    fn router() -> (DvRouter<RecordingTransport>, ManualClock) {
        router_with(RouterConfig::default())
    }

    fn lat(value: u32) -> Latency {
        Latency::new(value)
    }

    /// h attached on p1 (latency 5), neighbor on p2 (link latency 2).
    fn static_setup() -> (DvRouter<RecordingTransport>, ManualClock) {
        let (mut router, clock) = router();
        router.handle_link_up(1, lat(5));
        router.handle_link_up(2, lat(2));
        router.add_static_route("h", 1);
        (router, clock)
    }

    #[test]
    fn static_route_uses_port_latency_and_never_expires() {
        let (mut router, clock) = static_setup();
        let entry = router.table().get("h").unwrap().clone();
        assert_eq!(entry.port, 1);
        assert_eq!(entry.latency, lat(5));
        assert_eq!(entry.expire_time, FOREVER);

        clock.advance(Duration::from_secs(3600));
        router.expire_routes();
        assert_eq!(router.table().get("h"), Some(&entry));
    }

    #[test]
    #[should_panic(expected = "should be up")]
    fn static_route_on_down_port_panics() {
        let (mut router, _) = router();
        router.add_static_route("h", 7);
    }

    #[test]
    fn equal_candidate_from_other_port_is_ignored() {
        let (mut router, _) = static_setup();
        router.handle_route_advertisement("h", lat(3), 2);

        let entry = router.table().get("h").unwrap();
        assert_eq!(entry.port, 1);
        assert_eq!(entry.latency, lat(5));
        assert_eq!(entry.expire_time, FOREVER);
    }

    #[test]
    fn shorter_candidate_replaces_current_route() {
        let (mut router, clock) = static_setup();
        router.handle_route_advertisement("h", lat(1), 2);

        let entry = router.table().get("h").unwrap();
        assert_eq!(entry.port, 2);
        assert_eq!(entry.latency, lat(3));
        assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));
    }

    #[test]
    fn unknown_destination_is_installed() {
        let (mut router, clock) = router();
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("far", lat(4), 2);

        let entry = router.table().get("far").unwrap();
        assert_eq!(entry.port, 2);
        assert_eq!(entry.latency, lat(6));
        assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));
    }

    #[test]
    fn infinity_for_unknown_destination_installs_poisoned_entry() {
        let (mut router, clock) = router();
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("far", INFINITY, 2);

        let entry = router.table().get("far").unwrap();
        assert_eq!(entry.latency, INFINITY);
        assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));
        assert!(router.transport().routes.is_empty());
    }

    #[test]
    fn worse_update_from_current_next_hop_is_accepted() {
        let (mut router, clock) = router();
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("far", lat(1), 2);

        clock.advance(Duration::from_secs(5));
        router.handle_route_advertisement("far", lat(9), 2);

        let entry = router.table().get("far").unwrap();
        assert_eq!(entry.latency, lat(11));
        assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));
    }

    #[test]
    fn worse_update_from_other_neighbor_is_ignored() {
        let (mut router, _) = router();
        router.handle_link_up(2, lat(2));
        router.handle_link_up(3, lat(1));
        router.handle_route_advertisement("far", lat(1), 2);
        router.handle_route_advertisement("far", lat(5), 3);

        let entry = router.table().get("far").unwrap();
        assert_eq!(entry.port, 2);
        assert_eq!(entry.latency, lat(3));
    }

    #[test]
    fn candidate_is_clamped_to_infinity() {
        let (mut router, _) = router();
        router.handle_link_up(2, lat(10));
        router.handle_route_advertisement("far", lat(12), 2);

        assert_eq!(router.table().get("far").unwrap().latency, INFINITY);
    }

    #[test]
    fn poison_from_next_hop_poisons_and_broadcasts() {
        let (mut router, _) = static_setup();
        router.handle_link_up(3, lat(1));
        router.handle_route_advertisement("h", lat(1), 2);
        let expiry = router.table().get("h").unwrap().expire_time;
        router.transport_mut().clear();

        router.handle_route_advertisement("h", INFINITY, 2);

        let entry = router.table().get("h").unwrap();
        assert_eq!(entry.port, 2);
        assert_eq!(entry.latency, INFINITY);
        assert_eq!(entry.expire_time, expiry);

        // Forced broadcast reaches every up port.
        for port in [1, 2, 3] {
            assert!(router.transport().routes_on(port).contains(&("h".to_string(), INFINITY)));
        }
    }

    #[test]
    fn poison_from_other_neighbor_is_ignored() {
        let (mut router, _) = static_setup();
        router.handle_route_advertisement("h", INFINITY, 2);

        let entry = router.table().get("h").unwrap();
        assert_eq!(entry.port, 1);
        assert_eq!(entry.latency, lat(5));
        assert!(router.transport().routes.is_empty());
    }

    #[test]
    fn poison_wins_even_if_candidate_would_be_shorter() {
        let (mut router, _) = router();
        router.handle_link_up(2, lat(1));
        router.handle_route_advertisement("far", lat(8), 2);
        router.handle_route_advertisement("far", INFINITY, 2);

        assert_eq!(router.table().get("far").unwrap().latency, INFINITY);
    }

    #[test]
    fn plain_policy_advertises_on_every_port() {
        let (mut router, _) = static_setup();
        router.transport_mut().clear();
        router.send_routes(true, None);

        assert_eq!(router.transport().routes_on(1), vec![("h".to_string(), lat(5))]);
        assert_eq!(router.transport().routes_on(2), vec![("h".to_string(), lat(5))]);
    }

    #[test]
    fn split_horizon_never_advertises_back() {
        let (mut router, _) = router_with(RouterConfig {
            split_horizon: true,
            ..Default::default()
        });
        assert_eq!(router.settings().policy, AdvertisementPolicy::SplitHorizon);
        router.handle_link_up(1, lat(5));
        router.handle_link_up(2, lat(2));
        router.add_static_route("h", 1);
        router.handle_route_advertisement("far", lat(1), 2);
        router.send_routes(true, None);

        assert_eq!(router.transport().routes_on(1), vec![("far".to_string(), lat(3))]);
        assert_eq!(router.transport().routes_on(2), vec![("h".to_string(), lat(5))]);
    }

    #[test]
    fn poison_reverse_sends_infinity_back() {
        let (mut router, _) = router_with(RouterConfig {
            poison_reverse: true,
            ..Default::default()
        });
        router.handle_link_up(1, lat(5));
        router.handle_link_up(2, lat(2));
        router.add_static_route("h", 1);
        router.handle_route_advertisement("far", lat(1), 2);
        router.send_routes(true, None);

        assert_eq!(
            router.transport().routes_on(1),
            vec![("far".to_string(), lat(3)), ("h".to_string(), INFINITY)]
        );
        assert_eq!(
            router.transport().routes_on(2),
            vec![("far".to_string(), INFINITY), ("h".to_string(), lat(5))]
        );
    }

    #[test]
    fn unforced_send_skips_unchanged_values() {
        let (mut router, _) = static_setup();
        router.send_routes(false, None);
        assert_eq!(router.transport().routes.len(), 2);

        router.transport_mut().clear();
        router.send_routes(false, None);
        assert!(router.transport().routes.is_empty());

        router.handle_route_advertisement("h", lat(1), 2);
        router.send_routes(false, None);
        assert_eq!(router.transport().routes_on(1), vec![("h".to_string(), lat(3))]);
        assert_eq!(router.transport().routes_on(2), vec![("h".to_string(), lat(3))]);
    }

    #[test]
    fn without_history_every_send_repeats() {
        let (mut router, _) = router_with(RouterConfig {
            advertisement_history: false,
            ..Default::default()
        });
        router.handle_link_up(1, lat(5));
        router.add_static_route("h", 1);
        router.send_routes(false, None);
        router.send_routes(false, None);
        assert_eq!(router.transport().routes.len(), 2);
    }

    #[test]
    fn expired_route_is_removed() {
        let (mut router, clock) = router();
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("far", lat(1), 2);

        clock.advance(TTL);
        router.expire_routes();
        assert!(router.table().get("far").is_some());

        clock.advance(Duration::from_millis(1));
        router.expire_routes();
        assert!(router.table().get("far").is_none());
    }

    #[test]
    fn expired_route_is_poisoned_then_removed() {
        let (mut router, clock) = router_with(RouterConfig {
            poison_expired: true,
            ..Default::default()
        });
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("far", lat(1), 2);

        clock.advance(TTL + Duration::from_secs(1));
        router.expire_routes();
        let entry = router.table().get("far").unwrap();
        assert_eq!(entry.latency, INFINITY);
        assert_eq!(entry.port, 2);
        assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));

        clock.advance(TTL + Duration::from_secs(1));
        router.expire_routes();
        assert!(router.table().get("far").is_none());
    }

    #[test]
    fn static_routes_do_not_stop_the_sweep() {
        let (mut router, clock) = router();
        router.handle_link_up(1, lat(1));
        router.handle_link_up(2, lat(2));
        for host in ["a", "b", "c"] {
            router.add_static_route(host, 1);
        }
        for dst in ["x", "y", "z"] {
            router.handle_route_advertisement(dst, lat(1), 2);
        }

        clock.advance(TTL * 2);
        router.expire_routes();

        let mut left = router.table().destinations();
        left.sort();
        assert_eq!(left, vec!["a", "b", "c"]);
    }

    #[test]
    fn link_up_sends_table_to_new_port_only() {
        let (mut router, _) = router_with(RouterConfig {
            send_on_link_up: true,
            ..Default::default()
        });
        router.handle_link_up(1, lat(5));
        router.add_static_route("h", 1);
        router.transport_mut().clear();

        router.handle_link_up(2, lat(2));
        assert_eq!(router.transport().routes_on(2), vec![("h".to_string(), lat(5))]);
        assert!(router.transport().routes_on(1).is_empty());
    }

    #[test]
    fn link_up_is_quiet_when_disabled() {
        let (mut router, _) = static_setup();
        router.transport_mut().clear();
        router.handle_link_up(3, lat(1));
        assert!(router.transport().routes.is_empty());
        assert_eq!(router.ports().get_latency(3), Some(lat(1)));
    }

    #[test]
    fn link_down_poisons_routes_through_that_port() {
        let (mut router, clock) = router_with(RouterConfig {
            poison_on_link_down: true,
            ..Default::default()
        });
        router.handle_link_up(1, lat(5));
        router.handle_link_up(2, lat(2));
        router.handle_link_up(3, lat(1));
        router.add_static_route("h", 1);
        router.handle_route_advertisement("x", lat(1), 2);
        router.handle_route_advertisement("y", lat(4), 2);
        router.handle_route_advertisement("z", lat(1), 3);
        router.transport_mut().clear();

        clock.advance(Duration::from_secs(3));
        router.handle_link_down(2);

        for dst in ["x", "y"] {
            let entry = router.table().get(dst).unwrap();
            assert_eq!(entry.latency, INFINITY);
            assert_eq!(entry.expire_time, Expiry::At(clock.now() + TTL));
        }
        assert_eq!(router.table().get("z").unwrap().latency, lat(2));
        assert_eq!(router.table().get("h").unwrap().latency, lat(5));

        assert!(!router.ports().contains(2));
        assert!(router.transport().routes_on(2).is_empty());
        assert!(router.transport().routes_on(1).contains(&("x".to_string(), INFINITY)));
        assert!(router.transport().routes_on(3).contains(&("y".to_string(), INFINITY)));
    }

    #[test]
    fn link_down_without_poison_leaves_routes_to_expire() {
        let (mut router, clock) = router();
        router.handle_link_up(2, lat(2));
        router.handle_route_advertisement("x", lat(1), 2);
        router.handle_link_down(2);

        assert_eq!(router.table().get("x").unwrap().latency, lat(3));
        clock.advance(TTL * 2);
        router.expire_routes();
        assert!(router.table().get("x").is_none());
    }

    #[test]
    fn advertisement_on_down_port_is_ignored() {
        let (mut router, _) = router();
        router.handle_route_advertisement("x", lat(1), 4);
        assert!(router.table().is_empty());
    }

    #[test]
    fn data_packet_follows_route() {
        let (mut router, _) = static_setup();
        router.handle_data_packet(DataPacket::new("s", "h", "ping"), 2);
        assert_eq!(router.transport().packets.len(), 1);
        assert_eq!(router.transport().packets[0].0, 1);
    }

    #[test]
    fn data_packet_drops() {
        let (mut router, _) = static_setup();
        router.handle_route_advertisement("far", lat(1), 2);
        router.handle_route_advertisement("gone", lat(1), 2);
        router.handle_route_advertisement("gone", INFINITY, 2);

        // No route.
        router.handle_data_packet(DataPacket::new("s", "nowhere", ""), 1);
        // Unreachable.
        router.handle_data_packet(DataPacket::new("s", "gone", ""), 1);
        // Would bounce back out its inbound port.
        router.handle_data_packet(DataPacket::new("s", "far", ""), 2);

        assert!(router.transport().packets.is_empty());
    }

    #[test]
    fn timer_expires_then_broadcasts() {
        let (mut router, clock) = static_setup();
        router.handle_route_advertisement("far", lat(1), 2);
        clock.advance(TTL * 2);
        router.transport_mut().clear();

        router.handle_timer();

        assert!(router.table().get("far").is_none());
        assert_eq!(router.transport().routes_on(1), vec![("h".to_string(), lat(5))]);
        assert_eq!(router.transport().routes_on(2), vec![("h".to_string(), lat(5))]);
    }
}
