//! Result codes reported back to callers and listeners

/// Outcome of a local control request (device select, port switch, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResult {
    Success,
    Timeout,
    Communication,
    AlreadyInProgress,
    Exception,
    IncorrectMode,
    TargetNotAvailable,
    SourceNotAvailable,
    InvalidArguments,
}

impl ControlResult {
    pub fn is_success(self) -> bool {
        self == ControlResult::Success
    }
}

/// `<Report Power Status>` operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStatus {
    On,
    Standby,
    TransientToOn,
    TransientToStandby,
    Unknown,
}

impl PowerStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PowerStatus::On,
            1 => PowerStatus::Standby,
            2 => PowerStatus::TransientToOn,
            3 => PowerStatus::TransientToStandby,
            _ => PowerStatus::Unknown,
        }
    }

    /// Wire value; `Unknown` has no operand and maps to 0xFF
    pub fn as_u8(self) -> u8 {
        match self {
            PowerStatus::On => 0,
            PowerStatus::Standby => 1,
            PowerStatus::TransientToOn => 2,
            PowerStatus::TransientToStandby => 3,
            PowerStatus::Unknown => 0xFF,
        }
    }

    pub fn is_on_or_transient_to_on(self) -> bool {
        matches!(self, PowerStatus::On | PowerStatus::TransientToOn)
    }

    pub fn is_standby_or_transient(self) -> bool {
        matches!(
            self,
            PowerStatus::Standby | PowerStatus::TransientToStandby
        )
    }
}

/// Result announced for a one-touch record request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    /// Another recorder is already recording for us
    PreviousRecordingInProgress,
    /// Recorder is missing or is not a recording device
    CheckRecorderConnection,
    /// Record source could not be built or validated
    FailToRecordDisplayedScreen,
    /// CEC control is switched off
    CecDisabled,
    /// `<Record Status>` operand reported by the recorder
    Status(u8),
}

impl RecordResult {
    pub fn code(self) -> u8 {
        match self {
            RecordResult::PreviousRecordingInProgress => 0x30,
            RecordResult::CheckRecorderConnection => 0x31,
            RecordResult::FailToRecordDisplayedScreen => 0x32,
            RecordResult::CecDisabled => 0x33,
            RecordResult::Status(status) => status,
        }
    }
}

/// Result announced for a timer recording request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRecordingResult {
    CheckRecorderConnection,
    FailToRecordSelectedSource,
    CecDisabled,
    /// `<Timer Status>` operand bytes, big-endian
    Status(u32),
}

impl TimerRecordingResult {
    pub fn code(self) -> u32 {
        match self {
            TimerRecordingResult::CheckRecorderConnection => 1,
            TimerRecordingResult::FailToRecordSelectedSource => 2,
            TimerRecordingResult::CecDisabled => 3,
            TimerRecordingResult::Status(status) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_status() {
        assert_eq!(PowerStatus::from_u8(0), PowerStatus::On);
        assert_eq!(PowerStatus::from_u8(3), PowerStatus::TransientToStandby);
        assert_eq!(PowerStatus::from_u8(9), PowerStatus::Unknown);
        assert!(PowerStatus::TransientToOn.is_on_or_transient_to_on());
        assert!(!PowerStatus::Standby.is_on_or_transient_to_on());
        assert!(PowerStatus::Standby.is_standby_or_transient());
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(RecordResult::CheckRecorderConnection.code(), 0x31);
        assert_eq!(RecordResult::Status(0x01).code(), 0x01);
        assert_eq!(TimerRecordingResult::CecDisabled.code(), 3);
    }
}
