//! Routing state of the TV: input ports, active path and active source

pub mod ports;
pub mod state;

pub use ports::{PortInfo, PortTable};
pub use state::{ActiveSource, RoutingTracker};
