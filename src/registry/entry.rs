//! Device records
//!
//! One `DeviceInfo` exists per logical address known to the TV. Records are
//! immutable values; an update (new OSD name, new vendor id) replaces the
//! record in the registry.

use std::fmt;

use crate::protocol::address::format_path;
use crate::protocol::constants::UNKNOWN_VENDOR_ID;
use crate::protocol::{DeviceType, LogicalAddress, PhysicalAddress, PortId};

/// A CEC device seen on the bus (or one of our own local devices)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub logical_address: LogicalAddress,
    pub physical_address: PhysicalAddress,
    /// Local input port the device is reachable through
    pub port_id: Option<PortId>,
    pub device_type: DeviceType,
    pub vendor_id: u32,
    /// OSD name, replaced on `<Set OSD Name>`
    pub display_name: String,
}

impl DeviceInfo {
    pub fn new(
        logical_address: LogicalAddress,
        physical_address: PhysicalAddress,
        port_id: Option<PortId>,
        device_type: DeviceType,
        vendor_id: u32,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            logical_address,
            physical_address,
            port_id,
            device_type,
            vendor_id,
            display_name: display_name.into(),
        }
    }

    /// Stand-in for an input that has no registered device behind it
    pub fn placeholder(path: PhysicalAddress, port_id: Option<PortId>) -> Self {
        Self::new(
            LogicalAddress::Unregistered,
            path,
            port_id,
            DeviceType::Reserved,
            UNKNOWN_VENDOR_ID,
            "",
        )
    }

    /// Whether the device can be selected as a TV input
    pub fn is_source_type(&self) -> bool {
        self.device_type.is_source_type()
    }

    /// Copy of this record with a new display name
    pub fn with_display_name(&self, name: impl Into<String>) -> Self {
        Self {
            display_name: name.into(),
            ..self.clone()
        }
    }

    /// Name used when a device never answers `<Give OSD Name>`
    pub fn default_name(logical_address: LogicalAddress) -> String {
        let role = match logical_address.device_type() {
            DeviceType::Tv => "TV",
            DeviceType::Recorder => "Recorder",
            DeviceType::Tuner => "Tuner",
            DeviceType::Playback => "Playback",
            DeviceType::AudioSystem => "Audio",
            DeviceType::Reserved => "Reserved",
        };
        format!("{}_{}", role, logical_address.as_u8())
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} path={} port={:?} type={:?} vendor={:06x} name={:?}",
            self.logical_address,
            format_path(self.physical_address),
            self.port_id,
            self.device_type,
            self.vendor_id,
            self.display_name
        )
    }
}
