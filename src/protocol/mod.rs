//! CEC wire protocol
//!
//! This module provides:
//! - Logical / physical address types and routing path arithmetic
//! - Opcode and operand constants (CEC 1.4)
//! - `CecMessage` with frame encoding and message builders
//! - Parameter validation for incoming messages
//! - Record source grammars used by one-touch and timer recording
//! - Result codes reported to callers

pub mod address;
pub mod constants;
pub mod message;
pub mod record;
pub mod status;
pub mod validator;

pub use address::{DeviceType, LogicalAddress, PhysicalAddress, PortId};
pub use message::CecMessage;
pub use status::{ControlResult, PowerStatus, RecordResult, TimerRecordingResult};
pub use validator::MessageValidator;
