//! HDMI input port table

use crate::protocol::constants::ROUTING_PATH_TOP_MASK;
use crate::protocol::{PhysicalAddress, PortId};

/// One hardware HDMI input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfo {
    pub id: PortId,
    /// Top-level path of the port (`n.0.0.0`)
    pub address: PhysicalAddress,
    pub cec_supported: bool,
    pub arc_supported: bool,
}

impl PortInfo {
    pub fn new(id: PortId, address: PhysicalAddress) -> Self {
        Self {
            id,
            address,
            cec_supported: true,
            arc_supported: false,
        }
    }

    pub fn with_arc(mut self) -> Self {
        self.arc_supported = true;
        self
    }
}

/// Maps port ids to top-level routing paths and back
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    ports: Vec<PortInfo>,
}

impl PortTable {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self { ports }
    }

    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    /// Port the path is reachable through, by its top nibble
    pub fn path_to_port_id(&self, path: PhysicalAddress) -> Option<PortId> {
        let top = path & ROUTING_PATH_TOP_MASK;
        self.ports
            .iter()
            .find(|port| port.address == top)
            .map(|port| port.id)
    }

    pub fn port_id_to_path(&self, port_id: PortId) -> Option<PhysicalAddress> {
        self.get(port_id).map(|port| port.address)
    }

    pub fn is_valid_port_id(&self, port_id: PortId) -> bool {
        self.get(port_id).is_some()
    }

    /// Whether the device at `path` hangs off an ARC-capable input
    pub fn is_connected_to_arc_port(&self, path: PhysicalAddress) -> bool {
        self.path_to_port_id(path)
            .and_then(|id| self.get(id))
            .map(|port| port.arc_supported)
            .unwrap_or(false)
    }

    fn get(&self, port_id: PortId) -> Option<&PortInfo> {
        self.ports.iter().find(|port| port.id == port_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PortTable {
        PortTable::new(vec![
            PortInfo::new(1, 0x1000),
            PortInfo::new(2, 0x2000).with_arc(),
            PortInfo::new(3, 0x3000),
        ])
    }

    #[test]
    fn test_path_port_mapping() {
        let ports = table();
        assert_eq!(ports.path_to_port_id(0x2110), Some(2));
        assert_eq!(ports.path_to_port_id(0x4000), None);
        assert_eq!(ports.path_to_port_id(0x0000), None);
        assert_eq!(ports.port_id_to_path(3), Some(0x3000));
        assert_eq!(ports.port_id_to_path(9), None);
        assert!(ports.is_valid_port_id(1));
        assert!(!ports.is_valid_port_id(0));
    }

    #[test]
    fn test_arc_port() {
        let ports = table();
        assert!(ports.is_connected_to_arc_port(0x2000));
        assert!(ports.is_connected_to_arc_port(0x2100));
        assert!(!ports.is_connected_to_arc_port(0x1000));
        assert!(!ports.is_connected_to_arc_port(0x5000));
    }
}
