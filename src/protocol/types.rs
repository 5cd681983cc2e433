use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

use crate::HostId;

/// Latency of a link or a route.
///
/// Values never exceed [`INFINITY`]; any sum that would reach it collapses to
/// it, so an unreachable route can never look shorter than a real one. This
/// holds for deserialized values too, which pass through [`Latency::new`].
/// Latencies are whole numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Latency(u32);

/// Latency that marks a destination as unreachable.
pub const INFINITY: Latency = Latency(16);

impl Latency {
    pub fn new(value: u32) -> Self {
        Latency(value.min(INFINITY.0))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self >= INFINITY
    }

    /// Latency of reaching something `other` away from a neighbor `self` away.
    pub fn extend(self, other: Latency) -> Latency {
        Latency::new(self.0.saturating_add(other.0))
    }
}

impl From<u32> for Latency {
    fn from(value: u32) -> Self {
        Latency::new(value)
    }
}

impl From<Latency> for u32 {
    fn from(latency: Latency) -> Self {
        latency.0
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// When a table entry goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Never expires. Used for directly attached hosts.
    Forever,
    At(Instant),
}

pub const FOREVER: Expiry = Expiry::Forever;

impl Expiry {
    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Expiry::Forever => false,
            Expiry::At(deadline) => now > *deadline,
        }
    }
}

/// A data-plane packet travelling between hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    pub src: HostId,
    pub dst: HostId,
    pub payload: String,
}

impl DataPacket {
    pub fn new(src: impl Into<HostId>, dst: impl Into<HostId>, payload: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            payload: payload.into(),
        }
    }
}
