pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

/// Identifier of a routing destination (a host attached somewhere in the network).
pub type HostId = String;

/// Identifier of a local port. Only meaningful to the router that owns it.
pub type PortId = u32;

pub use config::{AdvertisementPolicy, ProtocolSettings, RouterConfig};
pub use error::{ConfigError, TopologyError};
pub use protocol::DvRouter;
