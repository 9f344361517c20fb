//! CEC message framing and builders
//!
//! A CEC frame is a sequence of 10-bit blocks on the wire. The transport hands
//! us the data bytes only:
//!
//! ```text
//! +--------------+--------+---------------------+
//! | src:4 | dst:4 | opcode | operands (0..=14)   |
//! +--------------+--------+---------------------+
//! ```
//!
//! A frame with only the header block is a polling message. Polls never reach
//! the message layer, so decoding rejects them.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::address::{DeviceType, LogicalAddress, PhysicalAddress};
use super::constants::{opcode, MAX_FRAME_SIZE, MAX_PARAMS_SIZE};
use super::status::PowerStatus;
use crate::error::ProtocolError;

/// A decoded CEC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CecMessage {
    pub source: LogicalAddress,
    pub destination: LogicalAddress,
    pub opcode: u8,
    pub params: Bytes,
}

impl CecMessage {
    /// Create a message. Operands beyond the frame limit are truncated.
    pub fn new(
        source: LogicalAddress,
        destination: LogicalAddress,
        opcode: u8,
        params: impl Into<Bytes>,
    ) -> Self {
        let mut params: Bytes = params.into();
        if params.len() > MAX_PARAMS_SIZE {
            params.truncate(MAX_PARAMS_SIZE);
        }
        Self {
            source,
            destination,
            opcode,
            params,
        }
    }

    /// Message without operands
    pub fn command(source: LogicalAddress, destination: LogicalAddress, opcode: u8) -> Self {
        Self::new(source, destination, opcode, Bytes::new())
    }

    /// Decode a frame as delivered by the bus transport
    pub fn decode(mut frame: Bytes) -> Result<Self, ProtocolError> {
        if frame.len() < 2 {
            return Err(ProtocolError::FrameTooShort(frame.len()));
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong(frame.len()));
        }

        let header = frame.get_u8();
        let source = LogicalAddress::from_u8(header >> 4)
            .ok_or(ProtocolError::InvalidAddress(header >> 4))?;
        let destination = LogicalAddress::from_u8(header & 0x0F)
            .ok_or(ProtocolError::InvalidAddress(header & 0x0F))?;
        let opcode = frame.get_u8();

        Ok(Self {
            source,
            destination,
            opcode,
            params: frame,
        })
    }

    /// Encode into wire bytes (header, opcode, operands)
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.params.len());
        buf.put_u8((self.source.as_u8() << 4) | self.destination.as_u8());
        buf.put_u8(self.opcode);
        buf.put_slice(&self.params);
        buf.freeze()
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == LogicalAddress::BROADCAST
    }

    /// Single operand byte
    pub fn param(&self, index: usize) -> Option<u8> {
        self.params.get(index).copied()
    }

    /// Big-endian 16-bit operand starting at `offset`
    pub fn param_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.params.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Physical address operand at the start of the message
    pub fn physical_address(&self) -> Option<PhysicalAddress> {
        self.param_u16(0)
    }

    /// 24-bit vendor id operand of `<Device Vendor ID>`
    pub fn vendor_id(&self) -> Option<u32> {
        let bytes = self.params.get(0..3)?;
        Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Operands as an ASCII string, e.g. the name in `<Set OSD Name>`
    pub fn ascii_params(&self) -> Option<String> {
        if !self.params.is_ascii() {
            return None;
        }
        Some(self.params.iter().map(|&b| char::from(b)).collect())
    }
}

impl fmt::Display for CecMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{:#04x}> {}->{}",
            self.opcode,
            self.source.as_u8(),
            self.destination.as_u8()
        )?;
        if !self.params.is_empty() {
            write!(f, " [")?;
            for (i, b) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:02x}", b)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

fn path_bytes(path: PhysicalAddress) -> [u8; 2] {
    path.to_be_bytes()
}

pub fn build_feature_abort(
    src: LogicalAddress,
    dst: LogicalAddress,
    failed_opcode: u8,
    reason: u8,
) -> CecMessage {
    CecMessage::new(
        src,
        dst,
        opcode::FEATURE_ABORT,
        vec![failed_opcode, reason],
    )
}

pub fn build_give_physical_address(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_PHYSICAL_ADDRESS)
}

pub fn build_give_osd_name(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_OSD_NAME)
}

pub fn build_give_device_vendor_id(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_DEVICE_VENDOR_ID)
}

pub fn build_give_device_power_status(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_DEVICE_POWER_STATUS)
}

pub fn build_give_audio_status(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_AUDIO_STATUS)
}

pub fn build_give_system_audio_mode_status(
    src: LogicalAddress,
    dst: LogicalAddress,
) -> CecMessage {
    CecMessage::command(src, dst, opcode::GIVE_SYSTEM_AUDIO_MODE_STATUS)
}

/// `<Report Physical Address>`, always broadcast
pub fn build_report_physical_address(
    src: LogicalAddress,
    path: PhysicalAddress,
    device_type: DeviceType,
) -> CecMessage {
    let [hi, lo] = path_bytes(path);
    CecMessage::new(
        src,
        LogicalAddress::BROADCAST,
        opcode::REPORT_PHYSICAL_ADDRESS,
        vec![hi, lo, device_type.as_u8()],
    )
}

/// `<Device Vendor ID>`, always broadcast. Only the low 24 bits are sent.
pub fn build_device_vendor_id(src: LogicalAddress, vendor_id: u32) -> CecMessage {
    let bytes = vendor_id.to_be_bytes();
    CecMessage::new(
        src,
        LogicalAddress::BROADCAST,
        opcode::DEVICE_VENDOR_ID,
        bytes[1..].to_vec(),
    )
}

pub fn build_set_osd_name(src: LogicalAddress, dst: LogicalAddress, name: &str) -> CecMessage {
    let ascii: Vec<u8> = name
        .bytes()
        .filter(u8::is_ascii)
        .take(MAX_PARAMS_SIZE)
        .collect();
    CecMessage::new(src, dst, opcode::SET_OSD_NAME, ascii)
}

pub fn build_cec_version(src: LogicalAddress, dst: LogicalAddress, version: u8) -> CecMessage {
    CecMessage::new(src, dst, opcode::CEC_VERSION, vec![version])
}

pub fn build_report_power_status(
    src: LogicalAddress,
    dst: LogicalAddress,
    status: PowerStatus,
) -> CecMessage {
    CecMessage::new(src, dst, opcode::REPORT_POWER_STATUS, vec![status.as_u8()])
}

/// `<Set Menu Language>` with an ISO 639-2 code; `None` unless the code is
/// exactly three ASCII letters.
pub fn build_set_menu_language(src: LogicalAddress, language: &str) -> Option<CecMessage> {
    let bytes = language.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
        return None;
    }
    Some(CecMessage::new(
        src,
        LogicalAddress::BROADCAST,
        opcode::SET_MENU_LANGUAGE,
        bytes.to_ascii_lowercase(),
    ))
}

pub fn build_active_source(src: LogicalAddress, path: PhysicalAddress) -> CecMessage {
    CecMessage::new(
        src,
        LogicalAddress::BROADCAST,
        opcode::ACTIVE_SOURCE,
        path_bytes(path).to_vec(),
    )
}

/// `<Inactive Source>` is directed to the TV
pub fn build_inactive_source(src: LogicalAddress, path: PhysicalAddress) -> CecMessage {
    CecMessage::new(
        src,
        LogicalAddress::Tv,
        opcode::INACTIVE_SOURCE,
        path_bytes(path).to_vec(),
    )
}

pub fn build_routing_change(
    src: LogicalAddress,
    old_path: PhysicalAddress,
    new_path: PhysicalAddress,
) -> CecMessage {
    let mut params = Vec::with_capacity(4);
    params.extend_from_slice(&path_bytes(old_path));
    params.extend_from_slice(&path_bytes(new_path));
    CecMessage::new(src, LogicalAddress::BROADCAST, opcode::ROUTING_CHANGE, params)
}

pub fn build_set_stream_path(src: LogicalAddress, path: PhysicalAddress) -> CecMessage {
    CecMessage::new(
        src,
        LogicalAddress::BROADCAST,
        opcode::SET_STREAM_PATH,
        path_bytes(path).to_vec(),
    )
}

pub fn build_standby(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::STANDBY)
}

pub fn build_text_view_on(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::TEXT_VIEW_ON)
}

pub fn build_record_on(src: LogicalAddress, dst: LogicalAddress, record_source: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::RECORD_ON, record_source.to_vec())
}

pub fn build_record_off(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::RECORD_OFF)
}

pub fn build_set_digital_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::SET_DIGITAL_TIMER, params.to_vec())
}

pub fn build_set_analog_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::SET_ANALOG_TIMER, params.to_vec())
}

pub fn build_set_external_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::SET_EXTERNAL_TIMER, params.to_vec())
}

pub fn build_clear_digital_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::CLEAR_DIGITAL_TIMER, params.to_vec())
}

pub fn build_clear_analog_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::CLEAR_ANALOG_TIMER, params.to_vec())
}

pub fn build_clear_external_timer(src: LogicalAddress, dst: LogicalAddress, params: &[u8]) -> CecMessage {
    CecMessage::new(src, dst, opcode::CLEAR_EXTERNAL_TIMER, params.to_vec())
}

pub fn build_request_arc_initiation(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::REQUEST_ARC_INITIATION)
}

pub fn build_request_arc_termination(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::REQUEST_ARC_TERMINATION)
}

pub fn build_report_arc_initiated(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::REPORT_ARC_INITIATED)
}

pub fn build_report_arc_terminated(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::REPORT_ARC_TERMINATED)
}

/// `<System Audio Mode Request>`: turning on carries the active path, turning
/// off carries no operand.
pub fn build_system_audio_mode_request(
    src: LogicalAddress,
    avr: LogicalAddress,
    active_path: PhysicalAddress,
    enable: bool,
) -> CecMessage {
    if enable {
        CecMessage::new(
            src,
            avr,
            opcode::SYSTEM_AUDIO_MODE_REQUEST,
            path_bytes(active_path).to_vec(),
        )
    } else {
        CecMessage::command(src, avr, opcode::SYSTEM_AUDIO_MODE_REQUEST)
    }
}

pub fn build_user_control_pressed(
    src: LogicalAddress,
    dst: LogicalAddress,
    ui_command: u8,
) -> CecMessage {
    CecMessage::new(src, dst, opcode::USER_CONTROL_PRESSED, vec![ui_command])
}

pub fn build_user_control_released(src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
    CecMessage::command(src, dst, opcode::USER_CONTROL_RELEASED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_active_source() {
        let frame = Bytes::from_static(&[0x4F, 0x82, 0x30, 0x00]);
        let msg = CecMessage::decode(frame).unwrap();

        assert_eq!(msg.source, LogicalAddress::Playback1);
        assert!(msg.is_broadcast());
        assert_eq!(msg.opcode, opcode::ACTIVE_SOURCE);
        assert_eq!(msg.physical_address(), Some(0x3000));
    }

    #[test]
    fn test_decode_rejects_poll_and_oversize() {
        assert_eq!(
            CecMessage::decode(Bytes::from_static(&[0x04])),
            Err(ProtocolError::FrameTooShort(1))
        );
        assert_eq!(
            CecMessage::decode(Bytes::new()),
            Err(ProtocolError::FrameTooShort(0))
        );
        let long = Bytes::from(vec![0u8; 17]);
        assert_eq!(CecMessage::decode(long), Err(ProtocolError::FrameTooLong(17)));
    }

    #[test]
    fn test_encode_routing_change() {
        let msg = build_routing_change(LogicalAddress::Tv, 0x1000, 0x2000);
        assert_eq!(
            msg.encode().as_ref(),
            &[0x0F, opcode::ROUTING_CHANGE, 0x10, 0x00, 0x20, 0x00]
        );
        assert_eq!(msg.param_u16(2), Some(0x2000));
        assert_eq!(msg.param_u16(3), None);
    }

    #[test]
    fn test_report_physical_address_and_vendor() {
        let msg = build_report_physical_address(LogicalAddress::Tv, 0x0000, DeviceType::Tv);
        assert_eq!(msg.params.as_ref(), &[0x00, 0x00, 0x00]);

        let msg = build_device_vendor_id(LogicalAddress::Tv, 0x00_8045);
        assert_eq!(msg.params.as_ref(), &[0x00, 0x80, 0x45]);
    }

    #[test]
    fn test_vendor_id_and_name_operands() {
        let msg = build_device_vendor_id(LogicalAddress::Playback1, 0x00_E091);
        assert_eq!(msg.vendor_id(), Some(0x00_E091));

        let name = build_set_osd_name(LogicalAddress::Playback1, LogicalAddress::Tv, "Player");
        assert_eq!(name.ascii_params().as_deref(), Some("Player"));

        let garbage = CecMessage::new(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            opcode::SET_OSD_NAME,
            vec![0xC3, 0xA9],
        );
        assert_eq!(garbage.ascii_params(), None);
    }

    #[test]
    fn test_set_menu_language() {
        let msg = build_set_menu_language(LogicalAddress::Tv, "ENG").unwrap();
        assert_eq!(msg.params.as_ref(), b"eng");
        assert!(build_set_menu_language(LogicalAddress::Tv, "en").is_none());
        assert!(build_set_menu_language(LogicalAddress::Tv, "e1g").is_none());
    }

    #[test]
    fn test_system_audio_mode_request() {
        let on = build_system_audio_mode_request(
            LogicalAddress::Tv,
            LogicalAddress::AudioSystem,
            0x2100,
            true,
        );
        assert_eq!(on.params.as_ref(), &[0x21, 0x00]);

        let off = build_system_audio_mode_request(
            LogicalAddress::Tv,
            LogicalAddress::AudioSystem,
            0x2100,
            false,
        );
        assert!(off.params.is_empty());
    }

    #[test]
    fn test_osd_name_truncated() {
        let msg = build_set_osd_name(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            "A very long display name",
        );
        assert_eq!(msg.params.len(), MAX_PARAMS_SIZE);
    }

    #[test]
    fn test_display() {
        let msg = build_active_source(LogicalAddress::Playback1, 0x1000);
        assert_eq!(msg.to_string(), "<0x82> 4->15 [10 00]");
    }
}
