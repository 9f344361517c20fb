//! CEC addressing
//!
//! Logical addresses are 4-bit role codes. Physical addresses are 16-bit
//! routing paths made of four nibbles, most significant first, each naming
//! the port taken at one level of the HDMI tree below the TV (`0.0.0.0`).
//!
//! ```text
//!            TV 0.0.0.0
//!           /          \
//!     1.0.0.0          2.0.0.0   (AVR)
//!                     /       \
//!               2.1.0.0      2.2.0.0
//! ```

use std::fmt;

use super::constants::ROUTING_PATH_TOP_MASK;

/// 16-bit routing path
pub type PhysicalAddress = u16;

/// Local HDMI input port id
pub type PortId = u16;

/// CEC 1.4 logical address table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogicalAddress {
    Tv = 0,
    Recorder1 = 1,
    Recorder2 = 2,
    Tuner1 = 3,
    Playback1 = 4,
    AudioSystem = 5,
    Tuner2 = 6,
    Tuner3 = 7,
    Playback2 = 8,
    Recorder3 = 9,
    Tuner4 = 10,
    Playback3 = 11,
    Reserved1 = 12,
    Reserved2 = 13,
    SpecificUse = 14,
    /// Unregistered as a source, broadcast as a destination
    Unregistered = 15,
}

impl LogicalAddress {
    /// Broadcast destination (same nibble as `Unregistered`)
    pub const BROADCAST: LogicalAddress = LogicalAddress::Unregistered;

    /// All addresses a remote device can own, in bus order
    pub const REMOTE_CANDIDATES: [LogicalAddress; 14] = [
        LogicalAddress::Recorder1,
        LogicalAddress::Recorder2,
        LogicalAddress::Tuner1,
        LogicalAddress::Playback1,
        LogicalAddress::AudioSystem,
        LogicalAddress::Tuner2,
        LogicalAddress::Tuner3,
        LogicalAddress::Playback2,
        LogicalAddress::Recorder3,
        LogicalAddress::Tuner4,
        LogicalAddress::Playback3,
        LogicalAddress::Reserved1,
        LogicalAddress::Reserved2,
        LogicalAddress::SpecificUse,
    ];

    /// Parse a 4-bit address nibble
    pub fn from_u8(value: u8) -> Option<Self> {
        use LogicalAddress::*;
        let addr = match value {
            0 => Tv,
            1 => Recorder1,
            2 => Recorder2,
            3 => Tuner1,
            4 => Playback1,
            5 => AudioSystem,
            6 => Tuner2,
            7 => Tuner3,
            8 => Playback2,
            9 => Recorder3,
            10 => Tuner4,
            11 => Playback3,
            12 => Reserved1,
            13 => Reserved2,
            14 => SpecificUse,
            15 => Unregistered,
            _ => return None,
        };
        Some(addr)
    }

    /// Raw nibble value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Device type implied by the address
    pub fn device_type(self) -> DeviceType {
        use LogicalAddress::*;
        match self {
            Tv | SpecificUse => DeviceType::Tv,
            Recorder1 | Recorder2 | Recorder3 => DeviceType::Recorder,
            Tuner1 | Tuner2 | Tuner3 | Tuner4 => DeviceType::Tuner,
            Playback1 | Playback2 | Playback3 => DeviceType::Playback,
            AudioSystem => DeviceType::AudioSystem,
            Reserved1 | Reserved2 | Unregistered => DeviceType::Reserved,
        }
    }

    /// Addresses a local device of the given type may claim, preferred first
    pub fn candidates_for(device_type: DeviceType) -> &'static [LogicalAddress] {
        use LogicalAddress::*;
        match device_type {
            DeviceType::Tv => &[Tv, SpecificUse],
            DeviceType::Recorder => &[Recorder1, Recorder2, Recorder3],
            DeviceType::Tuner => &[Tuner1, Tuner2, Tuner3, Tuner4],
            DeviceType::Playback => &[Playback1, Playback2, Playback3],
            DeviceType::AudioSystem => &[AudioSystem],
            DeviceType::Reserved => &[],
        }
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u8())
    }
}

/// Primary device type as reported in `<Report Physical Address>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceType {
    Tv = 0,
    Recorder = 1,
    Reserved = 2,
    Tuner = 3,
    Playback = 4,
    AudioSystem = 5,
}

impl DeviceType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DeviceType::Tv,
            1 => DeviceType::Recorder,
            3 => DeviceType::Tuner,
            4 => DeviceType::Playback,
            5 => DeviceType::AudioSystem,
            _ => DeviceType::Reserved,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the device can act as an input source for the TV
    pub fn is_source_type(self) -> bool {
        matches!(
            self,
            DeviceType::Recorder | DeviceType::Tuner | DeviceType::Playback
        )
    }
}

/// Format a routing path as `a.b.c.d`
pub fn format_path(path: PhysicalAddress) -> String {
    format!(
        "{}.{}.{}.{}",
        (path >> 12) & 0xF,
        (path >> 8) & 0xF,
        (path >> 4) & 0xF,
        path & 0xF
    )
}

/// Top-level port path of a routing path (`1.2.2.0` -> `1.0.0.0`)
pub fn top_path(path: PhysicalAddress) -> PhysicalAddress {
    path & ROUTING_PATH_TOP_MASK
}

/// Whether `path` hangs off the branch that ends at `active_path`.
///
/// Nibbles are compared from the root down; the first terminator (0) in the
/// active path ends the comparison successfully. The internal source (0)
/// never has a tail.
pub fn is_tail_of_active_path(path: PhysicalAddress, active_path: PhysicalAddress) -> bool {
    if active_path == 0 {
        return false;
    }
    for shift in [12u16, 8, 4, 0] {
        let active_nibble = (active_path >> shift) & 0xF;
        if active_nibble == 0 {
            return true;
        }
        if (path >> shift) & 0xF != active_nibble {
            return false;
        }
    }
    false
}

/// Whether `new_path` is an ancestor or a descendant of `active_path`.
///
/// `(1.1.0.0, 1.0.0.0)` and `(1.2.1.0, 1.2.1.2)` are in the active path,
/// siblings and unrelated branches are not.
pub fn is_in_active_routing_path(active_path: PhysicalAddress, new_path: PhysicalAddress) -> bool {
    for shift in [12u16, 8, 4, 0] {
        let active_nibble = (active_path >> shift) & 0xF;
        if active_nibble == 0 {
            break;
        }
        let new_nibble = (new_path >> shift) & 0xF;
        if new_nibble == 0 {
            break;
        }
        if active_nibble != new_nibble {
            return false;
        }
    }
    true
}

/// Whether a `<Routing Change>` to `new_path` alters the active path.
///
/// True when the parent of `new_path` lies on the active path: a sibling
/// switch or a change at an ancestor. A change below a sibling does not
/// affect us.
pub fn is_affecting_active_routing_path(
    active_path: PhysicalAddress,
    new_path: PhysicalAddress,
) -> bool {
    let mut parent = new_path;
    for shift in [0u16, 4, 8, 12] {
        if (parent >> shift) & 0xF != 0 {
            parent &= !(0xF << shift);
            break;
        }
    }
    if parent == 0 {
        return true;
    }
    is_in_active_routing_path(active_path, parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_address_table() {
        assert_eq!(LogicalAddress::Tv.as_u8(), 0);
        assert_eq!(LogicalAddress::Recorder1.as_u8(), 1);
        assert_eq!(LogicalAddress::Tuner1.as_u8(), 3);
        assert_eq!(LogicalAddress::Playback1.as_u8(), 4);
        assert_eq!(LogicalAddress::AudioSystem.as_u8(), 5);
        assert_eq!(LogicalAddress::BROADCAST.as_u8(), 15);

        for value in 0..16u8 {
            let addr = LogicalAddress::from_u8(value).unwrap();
            assert_eq!(addr.as_u8(), value);
        }
        assert!(LogicalAddress::from_u8(16).is_none());
    }

    #[test]
    fn test_device_type_from_address() {
        assert_eq!(LogicalAddress::Recorder3.device_type(), DeviceType::Recorder);
        assert_eq!(LogicalAddress::Tuner4.device_type(), DeviceType::Tuner);
        assert_eq!(LogicalAddress::Playback2.device_type(), DeviceType::Playback);
        assert_eq!(LogicalAddress::AudioSystem.device_type(), DeviceType::AudioSystem);
        assert_eq!(LogicalAddress::Reserved1.device_type(), DeviceType::Reserved);

        assert!(DeviceType::Playback.is_source_type());
        assert!(DeviceType::Recorder.is_source_type());
        assert!(!DeviceType::AudioSystem.is_source_type());
        assert!(!DeviceType::Tv.is_source_type());
    }

    #[test]
    fn test_tail_of_active_path() {
        // Same path: terminator reached right after the match
        assert!(is_tail_of_active_path(0x3000, 0x3000));
        // Descendant of the active branch
        assert!(is_tail_of_active_path(0x1200, 0x1000));
        assert!(is_tail_of_active_path(0x1210, 0x1200));
        // Different branch
        assert!(!is_tail_of_active_path(0x2000, 0x1000));
        assert!(!is_tail_of_active_path(0x1300, 0x1200));
        // Parent of the active path is not a tail
        assert!(!is_tail_of_active_path(0x1000, 0x1200));
        // Internal source never has a tail
        assert!(!is_tail_of_active_path(0x1000, 0x0000));
        assert!(!is_tail_of_active_path(0x0000, 0x0000));
        // Full-depth active path has no terminator
        assert!(!is_tail_of_active_path(0x1111, 0x1111));
    }

    #[test]
    fn test_in_active_routing_path() {
        assert!(is_in_active_routing_path(0x1100, 0x1000));
        assert!(is_in_active_routing_path(0x1210, 0x1212));
        assert!(!is_in_active_routing_path(0x1100, 0x1200));
        assert!(!is_in_active_routing_path(0x1000, 0x2000));
    }

    #[test]
    fn test_affecting_active_routing_path() {
        assert!(is_affecting_active_routing_path(0x1100, 0x2000));
        assert!(is_affecting_active_routing_path(0x1100, 0x1200));
        assert!(!is_affecting_active_routing_path(0x1100, 0x1210));
        assert!(!is_affecting_active_routing_path(0x1000, 0x3200));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(top_path(0x1220), 0x1000);
        assert_eq!(format_path(0x1220), "1.2.2.0");
    }
}
