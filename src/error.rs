//! Error types
//!
//! Bus-level rejections (target not available, CEC disabled, ...) are not
//! errors; they are reported as result codes. The types here cover malformed
//! input and service plumbing failures.

use std::fmt;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or unexpected wire data
    Protocol(ProtocolError),
    /// Service thread / mailbox failure
    Service(ServiceError),
}

/// Errors raised while decoding or validating CEC frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame carries no opcode (a polling message) or is empty
    FrameTooShort(usize),
    /// Frame exceeds the 16 byte CEC block limit
    FrameTooLong(usize),
    /// Address nibble out of range or not allowed in this position
    InvalidAddress(u8),
    /// Parameters do not match the opcode's requirements
    InvalidParameters { opcode: u8, len: usize },
}

/// Errors raised by the service actor or its handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service thread has stopped and the mailbox is closed
    Closed,
    /// The service thread or its runtime could not be started
    Spawn(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Service(e) => write!(f, "Service error: {}", e),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::FrameTooShort(len) => write!(f, "Frame too short: {} bytes", len),
            ProtocolError::FrameTooLong(len) => write!(f, "Frame too long: {} bytes", len),
            ProtocolError::InvalidAddress(addr) => write!(f, "Invalid address: {:#x}", addr),
            ProtocolError::InvalidParameters { opcode, len } => {
                write!(f, "Invalid parameters for opcode {:#04x}: {} bytes", opcode, len)
            }
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Closed => write!(f, "Service mailbox closed"),
            ServiceError::Spawn(reason) => write!(f, "Failed to start service: {}", reason),
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for ProtocolError {}
impl std::error::Error for ServiceError {}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ServiceError> for Error {
    fn from(e: ServiceError) -> Self {
        Error::Service(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err: Error = ProtocolError::InvalidParameters { opcode: 0x82, len: 1 }.into();
        assert_eq!(
            err.to_string(),
            "Protocol error: Invalid parameters for opcode 0x82: 1 bytes"
        );

        let err: Error = ServiceError::Closed.into();
        assert_eq!(err.to_string(), "Service error: Service mailbox closed");
    }
}
