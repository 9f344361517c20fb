//! Service configuration

use std::time::Duration;

use crate::protocol::constants::{CEC_VERSION_1_4, UNKNOWN_VENDOR_ID};
use crate::protocol::{DeviceType, PhysicalAddress};
use crate::routing::PortInfo;

/// CEC service configuration options
#[derive(Debug, Clone)]
pub struct CecConfig {
    /// Physical address of this device (the TV is 0.0.0.0)
    pub physical_address: PhysicalAddress,

    /// Vendor id announced in `<Device Vendor ID>` (24 bits)
    pub vendor_id: u32,

    /// OSD name announced in `<Set OSD Name>`
    pub osd_name: String,

    /// ISO 639-2 menu language for `<Set Menu Language>`
    pub menu_language: String,

    /// Local device types hosted by this service
    pub device_types: Vec<DeviceType>,

    /// Hardware HDMI input ports
    pub ports: Vec<PortInfo>,

    /// CEC version operand reported in `<CEC Version>`
    pub cec_version: u8,

    /// Default for the CEC control switch when the settings store has none
    pub control_enabled: bool,

    /// Keep the current input when other devices claim active source
    pub prohibit_mode: bool,

    /// Capacity of the service mailbox
    pub mailbox_capacity: usize,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,

    /// Interval between hotplug detection polls
    pub hotplug_poll_interval: Duration,
}

impl Default for CecConfig {
    fn default() -> Self {
        Self {
            physical_address: 0x0000,
            vendor_id: UNKNOWN_VENDOR_ID,
            osd_name: "TV".to_string(),
            menu_language: "eng".to_string(),
            device_types: vec![DeviceType::Tv],
            ports: Vec::new(),
            cec_version: CEC_VERSION_1_4,
            control_enabled: true,
            prohibit_mode: false,
            mailbox_capacity: 64,
            event_capacity: 64,
            hotplug_poll_interval: Duration::from_secs(5),
        }
    }
}

impl CecConfig {
    /// Config for a playback device at the given physical address
    pub fn playback(physical_address: PhysicalAddress) -> Self {
        Self {
            physical_address,
            osd_name: "Player".to_string(),
            device_types: vec![DeviceType::Playback],
            ..Default::default()
        }
    }

    /// Set the physical address
    pub fn physical_address(mut self, address: PhysicalAddress) -> Self {
        self.physical_address = address;
        self
    }

    /// Set the vendor id (truncated to 24 bits)
    pub fn vendor_id(mut self, vendor_id: u32) -> Self {
        self.vendor_id = vendor_id & 0xFF_FFFF;
        self
    }

    /// Set the OSD name
    pub fn osd_name(mut self, name: impl Into<String>) -> Self {
        self.osd_name = name.into();
        self
    }

    /// Set the menu language
    pub fn menu_language(mut self, language: impl Into<String>) -> Self {
        self.menu_language = language.into();
        self
    }

    /// Add a local device type
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        if !self.device_types.contains(&device_type) {
            self.device_types.push(device_type);
        }
        self
    }

    /// Add an HDMI input port
    pub fn port(mut self, port: PortInfo) -> Self {
        self.ports.push(port);
        self
    }

    /// Set the default CEC control switch
    pub fn control_enabled(mut self, enabled: bool) -> Self {
        self.control_enabled = enabled;
        self
    }

    /// Enable prohibit mode
    pub fn prohibit_mode(mut self, enabled: bool) -> Self {
        self.prohibit_mode = enabled;
        self
    }

    /// Set mailbox capacity
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set hotplug poll interval
    pub fn hotplug_poll_interval(mut self, interval: Duration) -> Self {
        self.hotplug_poll_interval = interval;
        self
    }

    pub fn hosts(&self, device_type: DeviceType) -> bool {
        self.device_types.contains(&device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CecConfig::default();

        assert_eq!(config.physical_address, 0x0000);
        assert_eq!(config.vendor_id, UNKNOWN_VENDOR_ID);
        assert_eq!(config.device_types, vec![DeviceType::Tv]);
        assert!(config.control_enabled);
        assert!(!config.prohibit_mode);
        assert!(config.ports.is_empty());
    }

    #[test]
    fn test_playback_config() {
        let config = CecConfig::playback(0x1000);

        assert_eq!(config.physical_address, 0x1000);
        assert!(config.hosts(DeviceType::Playback));
        assert!(!config.hosts(DeviceType::Tv));
    }

    #[test]
    fn test_builder_ports() {
        let config = CecConfig::default()
            .port(PortInfo::new(1, 0x1000))
            .port(PortInfo::new(2, 0x2000).with_arc());

        assert_eq!(config.ports.len(), 2);
        assert!(config.ports[1].arc_supported);
    }

    #[test]
    fn test_builder_vendor_id_truncated() {
        let config = CecConfig::default().vendor_id(0xAB12_3456);

        assert_eq!(config.vendor_id, 0x12_3456);
    }

    #[test]
    fn test_builder_device_type_deduplicated() {
        let config = CecConfig::default()
            .device_type(DeviceType::Playback)
            .device_type(DeviceType::Tv);

        assert_eq!(config.device_types, vec![DeviceType::Tv, DeviceType::Playback]);
    }

    #[test]
    fn test_builder_capacities() {
        let config = CecConfig::default().mailbox_capacity(0).event_capacity(16);

        assert_eq!(config.mailbox_capacity, 1);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_builder_hotplug_interval() {
        let config = CecConfig::default().hotplug_poll_interval(Duration::from_secs(1));

        assert_eq!(config.hotplug_poll_interval, Duration::from_secs(1));
    }
}
