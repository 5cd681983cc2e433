pub mod fabric;
pub mod port;
pub mod topology;

pub use fabric::{Delivery, Network};
pub use port::PortRegistry;
pub use topology::{Endpoint, HostSpec, LinkSpec, Topology, Wiring};
