//! Active source and routing path state
//!
//! ```text
//!  no route ──update_active_input──► active(path) ──routing change──► invalidated
//!                                        ▲                               │
//!                                        └──────── routing control ──────┘
//! ```

use tracing::debug;

use super::ports::PortTable;
use crate::protocol::address::format_path;
use crate::protocol::{LogicalAddress, PhysicalAddress, PortId};

/// Identity of the device currently streaming to the TV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSource {
    pub logical_address: LogicalAddress,
    pub physical_address: PhysicalAddress,
}

impl ActiveSource {
    pub fn new(logical_address: LogicalAddress, physical_address: PhysicalAddress) -> Self {
        Self {
            logical_address,
            physical_address,
        }
    }
}

/// Routing state of the TV
#[derive(Debug)]
pub struct RoutingTracker {
    ports: PortTable,
    active_source: Option<ActiveSource>,
    active_path: PhysicalAddress,
    /// Port to fall back to on `<Inactive Source>` after an automatic switch
    prev_port: Option<PortId>,
}

impl RoutingTracker {
    pub fn new(ports: PortTable) -> Self {
        Self {
            ports,
            active_source: None,
            active_path: 0,
            prev_port: None,
        }
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn active_source(&self) -> Option<ActiveSource> {
        self.active_source
    }

    pub fn set_active_source(&mut self, source: ActiveSource) {
        self.active_source = Some(source);
    }

    pub fn invalidate_active_source(&mut self) {
        self.active_source = None;
    }

    pub fn active_path(&self) -> PhysicalAddress {
        self.active_path
    }

    pub fn set_active_path(&mut self, path: PhysicalAddress) {
        self.active_path = path;
    }

    pub fn active_port_id(&self) -> Option<PortId> {
        self.ports.path_to_port_id(self.active_path)
    }

    pub fn prev_port_id(&self) -> Option<PortId> {
        self.prev_port
    }

    pub fn invalidate_prev_port(&mut self) {
        self.prev_port = None;
    }

    /// Record a new active source. `known_remote` tells whether the source is
    /// a registered device other than ourselves; only then can a switch
    /// within the active port leave a fallback port behind.
    ///
    /// Returns false when nothing changed.
    pub fn update_active_source(&mut self, source: ActiveSource, known_remote: bool) -> bool {
        if self.active_source == Some(source) {
            return false;
        }
        self.active_source = Some(source);

        let active_port = self.active_port_id();
        if known_remote
            && active_port.is_some()
            && self.ports.path_to_port_id(source.physical_address) == active_port
        {
            self.prev_port = active_port;
        }
        true
    }

    /// Switch the routed input after an automatic source change. The port we
    /// leave becomes the fallback port. Returns false when the path is
    /// already active.
    pub fn update_active_input(&mut self, path: PhysicalAddress) -> bool {
        if path == self.active_path {
            return false;
        }
        self.prev_port = self.active_port_id();
        debug!(
            from = %format_path(self.active_path),
            to = %format_path(path),
            "Active input changed"
        );
        self.active_path = path;
        true
    }

    /// Switch to a port as a result of manual selection or routing control.
    /// Clears the fallback port. Returns false when the port is unknown or
    /// already active.
    pub fn update_active_port(&mut self, port_id: PortId) -> bool {
        self.prev_port = None;
        let Some(path) = self.ports.port_id_to_path(port_id) else {
            return false;
        };
        if self.active_port_id() == Some(port_id) && self.active_path == path {
            return false;
        }
        self.active_path = path;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ports::PortInfo;

    fn tracker() -> RoutingTracker {
        RoutingTracker::new(PortTable::new(vec![
            PortInfo::new(1, 0x1000),
            PortInfo::new(2, 0x2000),
        ]))
    }

    #[test]
    fn test_update_active_source_is_idempotent() {
        let mut routing = tracker();
        let source = ActiveSource::new(LogicalAddress::Playback1, 0x1000);
        assert!(routing.update_active_source(source, true));
        assert!(!routing.update_active_source(source, true));
        assert_eq!(routing.active_source(), Some(source));
    }

    #[test]
    fn test_prev_port_kept_for_switch_within_active_port() {
        let mut routing = tracker();
        routing.set_active_path(0x1000);

        // Source behind the active port: remember the port
        let source = ActiveSource::new(LogicalAddress::Playback1, 0x1100);
        routing.update_active_source(source, true);
        assert_eq!(routing.prev_port_id(), Some(1));

        // Source on another port leaves the fallback untouched
        routing.invalidate_prev_port();
        let other = ActiveSource::new(LogicalAddress::Playback2, 0x2000);
        routing.update_active_source(other, true);
        assert_eq!(routing.prev_port_id(), None);

        // Unknown devices never set it
        let unknown = ActiveSource::new(LogicalAddress::Tuner1, 0x1200);
        routing.update_active_source(unknown, false);
        assert_eq!(routing.prev_port_id(), None);
    }

    #[test]
    fn test_update_active_input_records_prev_port() {
        let mut routing = tracker();
        routing.set_active_path(0x1000);

        assert!(!routing.update_active_input(0x1000));
        assert!(routing.update_active_input(0x2000));
        assert_eq!(routing.prev_port_id(), Some(1));
        assert_eq!(routing.active_port_id(), Some(2));
    }

    #[test]
    fn test_manual_port_clears_prev_port() {
        let mut routing = tracker();
        routing.set_active_path(0x1000);
        routing.update_active_input(0x2000);
        assert_eq!(routing.prev_port_id(), Some(1));

        assert!(routing.update_active_port(1));
        assert_eq!(routing.prev_port_id(), None);
        assert_eq!(routing.active_path(), 0x1000);
        assert!(!routing.update_active_port(1));
        assert!(!routing.update_active_port(7));
    }
}
