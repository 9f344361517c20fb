//! CEC protocol constants
//!
//! Values follow HDMI 1.4 CEC. Only the part of the message
//! catalog used by the TV and playback controllers is listed.

/// Maximum frame size (header + opcode + 14 operands)
pub const MAX_FRAME_SIZE: usize = 16;

/// Maximum number of operand bytes in a message
pub const MAX_PARAMS_SIZE: usize = 14;

/// Physical address of the root (TV) device
pub const TV_PHYSICAL_ADDRESS: u16 = 0x0000;

/// Sentinel for "no physical address"
pub const INVALID_PHYSICAL_ADDRESS: u16 = 0xFFFF;

/// Mask selecting the top-level port of a routing path
pub const ROUTING_PATH_TOP_MASK: u16 = 0xF000;

/// Vendor id reported when none is configured
pub const UNKNOWN_VENDOR_ID: u32 = 0xFF_FFFF;

/// CEC version operand for 1.4
pub const CEC_VERSION_1_4: u8 = 0x05;

/// Volume reported before the AVR has told us anything
pub const UNKNOWN_VOLUME: i32 = -1;

/// Maximum volume on the CEC scale
pub const MAX_CEC_VOLUME: i32 = 100;

/// Opcodes
pub mod opcode {
    pub const FEATURE_ABORT: u8 = 0x00;
    pub const IMAGE_VIEW_ON: u8 = 0x04;
    pub const RECORD_ON: u8 = 0x09;
    pub const RECORD_STATUS: u8 = 0x0A;
    pub const RECORD_OFF: u8 = 0x0B;
    pub const TEXT_VIEW_ON: u8 = 0x0D;
    pub const RECORD_TV_SCREEN: u8 = 0x0F;
    pub const SET_MENU_LANGUAGE: u8 = 0x32;
    pub const CLEAR_ANALOG_TIMER: u8 = 0x33;
    pub const SET_ANALOG_TIMER: u8 = 0x34;
    pub const TIMER_STATUS: u8 = 0x35;
    pub const STANDBY: u8 = 0x36;
    pub const TIMER_CLEARED_STATUS: u8 = 0x43;
    pub const USER_CONTROL_PRESSED: u8 = 0x44;
    pub const USER_CONTROL_RELEASED: u8 = 0x45;
    pub const GIVE_OSD_NAME: u8 = 0x46;
    pub const SET_OSD_NAME: u8 = 0x47;
    pub const SYSTEM_AUDIO_MODE_REQUEST: u8 = 0x70;
    pub const GIVE_AUDIO_STATUS: u8 = 0x71;
    pub const SET_SYSTEM_AUDIO_MODE: u8 = 0x72;
    pub const REPORT_AUDIO_STATUS: u8 = 0x7A;
    pub const GIVE_SYSTEM_AUDIO_MODE_STATUS: u8 = 0x7D;
    pub const SYSTEM_AUDIO_MODE_STATUS: u8 = 0x7E;
    pub const ROUTING_CHANGE: u8 = 0x80;
    pub const ROUTING_INFORMATION: u8 = 0x81;
    pub const ACTIVE_SOURCE: u8 = 0x82;
    pub const GIVE_PHYSICAL_ADDRESS: u8 = 0x83;
    pub const REPORT_PHYSICAL_ADDRESS: u8 = 0x84;
    pub const REQUEST_ACTIVE_SOURCE: u8 = 0x85;
    pub const SET_STREAM_PATH: u8 = 0x86;
    pub const DEVICE_VENDOR_ID: u8 = 0x87;
    pub const VENDOR_COMMAND: u8 = 0x89;
    pub const GIVE_DEVICE_VENDOR_ID: u8 = 0x8C;
    pub const GIVE_DEVICE_POWER_STATUS: u8 = 0x8F;
    pub const REPORT_POWER_STATUS: u8 = 0x90;
    pub const GET_MENU_LANGUAGE: u8 = 0x91;
    pub const SET_DIGITAL_TIMER: u8 = 0x97;
    pub const CLEAR_DIGITAL_TIMER: u8 = 0x99;
    pub const INACTIVE_SOURCE: u8 = 0x9D;
    pub const CEC_VERSION: u8 = 0x9E;
    pub const GET_CEC_VERSION: u8 = 0x9F;
    pub const CLEAR_EXTERNAL_TIMER: u8 = 0xA1;
    pub const SET_EXTERNAL_TIMER: u8 = 0xA2;
    pub const INITIATE_ARC: u8 = 0xC0;
    pub const REPORT_ARC_INITIATED: u8 = 0xC1;
    pub const REPORT_ARC_TERMINATED: u8 = 0xC2;
    pub const REQUEST_ARC_INITIATION: u8 = 0xC3;
    pub const REQUEST_ARC_TERMINATION: u8 = 0xC4;
    pub const TERMINATE_ARC: u8 = 0xC5;
    pub const ABORT: u8 = 0xFF;
}

/// `<Feature Abort>` reasons
pub mod abort_reason {
    pub const UNRECOGNIZED_OPCODE: u8 = 0x00;
    pub const NOT_IN_CORRECT_MODE: u8 = 0x01;
    pub const CANNOT_PROVIDE_SOURCE: u8 = 0x02;
    pub const INVALID_OPERAND: u8 = 0x03;
    pub const REFUSED: u8 = 0x04;
}

/// `<User Control Pressed>` UI command codes
pub mod ui_command {
    pub const SELECT: u8 = 0x00;
    pub const POWER: u8 = 0x40;
    pub const VOLUME_UP: u8 = 0x41;
    pub const VOLUME_DOWN: u8 = 0x42;
    pub const MUTE: u8 = 0x43;
    pub const MUTE_FUNCTION: u8 = 0x65;
    pub const RESTORE_VOLUME_FUNCTION: u8 = 0x66;
    pub const POWER_ON_FUNCTION: u8 = 0x6D;
}

/// Record source type (first byte of a `<Record On>` operand)
pub mod record_source {
    pub const OWN_SOURCE: u8 = 1;
    pub const DIGITAL_SERVICE: u8 = 2;
    pub const ANALOGUE_SERVICE: u8 = 3;
    pub const EXTERNAL_PLUG: u8 = 4;
    pub const EXTERNAL_PHYSICAL_ADDRESS: u8 = 5;
}

/// Timer recording source types
pub mod timer_source {
    pub const DIGITAL: u8 = 1;
    pub const ANALOGUE: u8 = 2;
    pub const EXTERNAL: u8 = 3;
}
