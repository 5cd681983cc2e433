//! Per-port advertisement policy.

use super::routing_table::TableEntry;
use super::types::{INFINITY, Latency};
use crate::PortId;
use crate::config::AdvertisementPolicy;

/// Latency to advertise for `entry` on `port`, or `None` to stay silent.
pub fn advertised_latency(
    policy: AdvertisementPolicy,
    entry: &TableEntry,
    port: PortId,
) -> Option<Latency> {
    let learned_here = entry.port == port;
    match policy {
        AdvertisementPolicy::Plain => Some(entry.latency),
        AdvertisementPolicy::SplitHorizon if learned_here => None,
        AdvertisementPolicy::SplitHorizon => Some(entry.latency),
        AdvertisementPolicy::PoisonReverse if learned_here => Some(INFINITY),
        AdvertisementPolicy::PoisonReverse => Some(entry.latency),
    }
}
