//! Incoming message validation
//!
//! Every opcode the controllers understand has a minimum operand length and an
//! addressing rule. Messages violating either are dropped before dispatch.
//! Opcodes not listed here pass through; they end up feature-aborted or
//! ignored by the dispatcher.

use super::address::LogicalAddress;
use super::constants::opcode;
use super::message::CecMessage;
use crate::error::ProtocolError;

/// Addressing rule for an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dest {
    Direct,
    Broadcast,
    Any,
}

/// Validates decoded messages against per-opcode rules
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageValidator;

impl MessageValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check addressing and operand length
    pub fn validate(&self, message: &CecMessage) -> Result<(), ProtocolError> {
        let Some((min_len, dest)) = rule(message.opcode) else {
            return Ok(());
        };

        if message.source == LogicalAddress::Unregistered && !message.is_broadcast() {
            return Err(ProtocolError::InvalidAddress(message.source.as_u8()));
        }

        match dest {
            Dest::Direct if message.is_broadcast() => {
                return Err(ProtocolError::InvalidAddress(message.destination.as_u8()));
            }
            Dest::Broadcast if !message.is_broadcast() => {
                return Err(ProtocolError::InvalidAddress(message.destination.as_u8()));
            }
            _ => {}
        }

        if message.params.len() < min_len {
            return Err(ProtocolError::InvalidParameters {
                opcode: message.opcode,
                len: message.params.len(),
            });
        }
        Ok(())
    }
}

fn rule(op: u8) -> Option<(usize, Dest)> {
    let rule = match op {
        // One-touch play and routing
        opcode::ACTIVE_SOURCE => (2, Dest::Broadcast),
        opcode::INACTIVE_SOURCE => (2, Dest::Direct),
        opcode::REQUEST_ACTIVE_SOURCE => (0, Dest::Broadcast),
        opcode::ROUTING_CHANGE => (4, Dest::Broadcast),
        opcode::ROUTING_INFORMATION => (2, Dest::Broadcast),
        opcode::SET_STREAM_PATH => (2, Dest::Broadcast),
        opcode::TEXT_VIEW_ON | opcode::IMAGE_VIEW_ON => (0, Dest::Direct),
        opcode::STANDBY => (0, Dest::Any),

        // Device information
        opcode::GIVE_PHYSICAL_ADDRESS => (0, Dest::Direct),
        opcode::REPORT_PHYSICAL_ADDRESS => (3, Dest::Broadcast),
        opcode::GIVE_OSD_NAME => (0, Dest::Direct),
        opcode::SET_OSD_NAME => (1, Dest::Direct),
        opcode::GIVE_DEVICE_VENDOR_ID => (0, Dest::Direct),
        opcode::DEVICE_VENDOR_ID => (3, Dest::Broadcast),
        opcode::GIVE_DEVICE_POWER_STATUS => (0, Dest::Direct),
        opcode::REPORT_POWER_STATUS => (1, Dest::Direct),
        opcode::GET_CEC_VERSION => (0, Dest::Direct),
        opcode::CEC_VERSION => (1, Dest::Direct),
        opcode::GET_MENU_LANGUAGE => (0, Dest::Direct),
        opcode::SET_MENU_LANGUAGE => (3, Dest::Broadcast),
        opcode::VENDOR_COMMAND => (1, Dest::Direct),

        // General protocol
        opcode::FEATURE_ABORT => (2, Dest::Direct),
        opcode::ABORT => (0, Dest::Direct),

        // Remote control passthrough
        opcode::USER_CONTROL_PRESSED => (1, Dest::Direct),
        opcode::USER_CONTROL_RELEASED => (0, Dest::Direct),

        // System audio and ARC
        opcode::GIVE_AUDIO_STATUS => (0, Dest::Direct),
        opcode::REPORT_AUDIO_STATUS => (1, Dest::Direct),
        opcode::GIVE_SYSTEM_AUDIO_MODE_STATUS => (0, Dest::Direct),
        opcode::SYSTEM_AUDIO_MODE_REQUEST => (0, Dest::Direct),
        opcode::SET_SYSTEM_AUDIO_MODE => (1, Dest::Any),
        opcode::SYSTEM_AUDIO_MODE_STATUS => (1, Dest::Direct),
        opcode::INITIATE_ARC
        | opcode::REPORT_ARC_INITIATED
        | opcode::REPORT_ARC_TERMINATED
        | opcode::REQUEST_ARC_INITIATION
        | opcode::REQUEST_ARC_TERMINATION
        | opcode::TERMINATE_ARC => (0, Dest::Direct),

        // Recording
        opcode::RECORD_TV_SCREEN => (0, Dest::Direct),
        opcode::RECORD_ON => (1, Dest::Direct),
        opcode::RECORD_OFF => (0, Dest::Direct),
        opcode::RECORD_STATUS => (1, Dest::Direct),
        opcode::TIMER_STATUS => (1, Dest::Direct),
        opcode::TIMER_CLEARED_STATUS => (1, Dest::Direct),

        _ => return None,
    };
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{build_active_source, build_give_osd_name};

    #[test]
    fn test_accepts_well_formed() {
        let validator = MessageValidator::new();
        let msg = build_active_source(LogicalAddress::Playback1, 0x1000);
        assert!(validator.validate(&msg).is_ok());

        let msg = build_give_osd_name(LogicalAddress::Tv, LogicalAddress::Playback1);
        assert!(validator.validate(&msg).is_ok());
    }

    #[test]
    fn test_rejects_wrong_addressing() {
        let validator = MessageValidator::new();

        // <Active Source> must be broadcast
        let msg = CecMessage::new(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            opcode::ACTIVE_SOURCE,
            vec![0x10, 0x00],
        );
        assert_eq!(validator.validate(&msg), Err(ProtocolError::InvalidAddress(0)));

        // <Give OSD Name> must be directed
        let msg = build_give_osd_name(LogicalAddress::Tv, LogicalAddress::BROADCAST);
        assert_eq!(validator.validate(&msg), Err(ProtocolError::InvalidAddress(15)));
    }

    #[test]
    fn test_rejects_short_params() {
        let validator = MessageValidator::new();
        let msg = CecMessage::new(
            LogicalAddress::Playback1,
            LogicalAddress::BROADCAST,
            opcode::REPORT_PHYSICAL_ADDRESS,
            vec![0x10, 0x00],
        );
        assert_eq!(
            validator.validate(&msg),
            Err(ProtocolError::InvalidParameters {
                opcode: opcode::REPORT_PHYSICAL_ADDRESS,
                len: 2
            })
        );
    }

    #[test]
    fn test_unknown_opcode_passes() {
        let validator = MessageValidator::new();
        let msg = CecMessage::command(LogicalAddress::Tuner1, LogicalAddress::Tv, 0xA0);
        assert!(validator.validate(&msg).is_ok());
    }
}
