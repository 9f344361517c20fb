//! Record source operands
//!
//! One-touch record (`<Record On>`) operand:
//!
//! ```text
//! [type] [extra data]
//!   1    own source           (no extra data)
//!   2    digital service      7 bytes
//!   3    analogue service     4 bytes
//!   4    external plug        1 byte
//!   5    external phys. addr  2 bytes
//! ```
//!
//! Timer recording operands start with a 7 byte timer info block, followed by
//! the source data selected by the timer source type. External sources carry a
//! one byte specifier (plug / physical address) before their data.

use super::address::PhysicalAddress;
use super::constants::{record_source, timer_source};

/// Size of the timer info block (day, month, start, duration, sequence)
pub const TIMER_INFO_SIZE: usize = 7;

const DIGITAL_SERVICE_SIZE: usize = 7;
const ANALOGUE_SERVICE_SIZE: usize = 4;
const EXTERNAL_PLUG_SIZE: usize = 1;
const EXTERNAL_PHYSICAL_ADDRESS_SIZE: usize = 2;

/// External source specifiers inside a timer operand
const EXTERNAL_SPECIFIER_PLUG: u8 = 4;
const EXTERNAL_SPECIFIER_PHYSICAL_ADDRESS: u8 = 5;

/// Typed one-touch record source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    OwnSource,
    /// Raw digital service identification
    DigitalService([u8; DIGITAL_SERVICE_SIZE]),
    AnalogueService {
        broadcast_type: u8,
        frequency: u16,
        broadcast_system: u8,
    },
    ExternalPlug(u8),
    ExternalPhysicalAddress(PhysicalAddress),
}

impl RecordSource {
    /// Serialize into a `<Record On>` operand
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            RecordSource::OwnSource => vec![record_source::OWN_SOURCE],
            RecordSource::DigitalService(data) => {
                let mut out = vec![record_source::DIGITAL_SERVICE];
                out.extend_from_slice(&data);
                out
            }
            RecordSource::AnalogueService {
                broadcast_type,
                frequency,
                broadcast_system,
            } => {
                let [hi, lo] = frequency.to_be_bytes();
                vec![
                    record_source::ANALOGUE_SERVICE,
                    broadcast_type,
                    hi,
                    lo,
                    broadcast_system,
                ]
            }
            RecordSource::ExternalPlug(plug) => vec![record_source::EXTERNAL_PLUG, plug],
            RecordSource::ExternalPhysicalAddress(path) => {
                let [hi, lo] = path.to_be_bytes();
                vec![record_source::EXTERNAL_PHYSICAL_ADDRESS, hi, lo]
            }
        }
    }
}

/// Timer info block shared by all timer programming messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub day_of_month: u8,
    pub month_of_year: u8,
    pub start_hour: u8,
    pub start_minute: u8,
    pub duration_hour: u8,
    pub duration_minute: u8,
    pub recording_sequence: u8,
}

impl TimerInfo {
    pub fn to_bytes(&self) -> [u8; TIMER_INFO_SIZE] {
        [
            self.day_of_month,
            self.month_of_year,
            to_bcd(self.start_hour),
            to_bcd(self.start_minute),
            to_bcd(self.duration_hour),
            to_bcd(self.duration_minute),
            self.recording_sequence,
        ]
    }
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Structural check of a `<Record On>` operand
pub fn check_record_source(data: &[u8]) -> bool {
    let Some((&source_type, extra)) = data.split_first() else {
        return false;
    };
    let expected = match source_type {
        record_source::OWN_SOURCE => 0,
        record_source::DIGITAL_SERVICE => DIGITAL_SERVICE_SIZE,
        record_source::ANALOGUE_SERVICE => ANALOGUE_SERVICE_SIZE,
        record_source::EXTERNAL_PLUG => EXTERNAL_PLUG_SIZE,
        record_source::EXTERNAL_PHYSICAL_ADDRESS => EXTERNAL_PHYSICAL_ADDRESS_SIZE,
        _ => return false,
    };
    extra.len() == expected
}

/// Structural check of a timer recording operand for the given source type
pub fn check_timer_record_source(source_type: u8, data: &[u8]) -> bool {
    if data.len() < TIMER_INFO_SIZE {
        return false;
    }
    let source_size = data.len() - TIMER_INFO_SIZE;
    match source_type {
        timer_source::DIGITAL => source_size == DIGITAL_SERVICE_SIZE,
        timer_source::ANALOGUE => source_size == ANALOGUE_SERVICE_SIZE,
        timer_source::EXTERNAL => match data.get(TIMER_INFO_SIZE) {
            Some(&EXTERNAL_SPECIFIER_PLUG) => source_size == EXTERNAL_PLUG_SIZE + 1,
            Some(&EXTERNAL_SPECIFIER_PHYSICAL_ADDRESS) => {
                source_size == EXTERNAL_PHYSICAL_ADDRESS_SIZE + 1
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_source_sizes() {
        assert!(check_record_source(&RecordSource::OwnSource.to_bytes()));
        assert!(check_record_source(
            &RecordSource::DigitalService([0; 7]).to_bytes()
        ));
        assert!(check_record_source(
            &RecordSource::AnalogueService {
                broadcast_type: 0,
                frequency: 0x1234,
                broadcast_system: 1
            }
            .to_bytes()
        ));
        assert!(check_record_source(&RecordSource::ExternalPlug(1).to_bytes()));
        assert!(check_record_source(
            &RecordSource::ExternalPhysicalAddress(0x1000).to_bytes()
        ));
    }

    #[test]
    fn test_record_source_rejects_bad_input() {
        assert!(!check_record_source(&[]));
        assert!(!check_record_source(&[record_source::OWN_SOURCE, 0]));
        assert!(!check_record_source(&[record_source::EXTERNAL_PLUG]));
        assert!(!check_record_source(&[9, 1, 2]));
    }

    #[test]
    fn test_timer_record_source() {
        let info = TimerInfo {
            day_of_month: 1,
            month_of_year: 2,
            start_hour: 20,
            start_minute: 30,
            duration_hour: 1,
            duration_minute: 45,
            recording_sequence: 0,
        }
        .to_bytes();
        assert_eq!(info[2], 0x20);
        assert_eq!(info[5], 0x45);

        let mut digital = info.to_vec();
        digital.extend_from_slice(&[0; 7]);
        assert!(check_timer_record_source(timer_source::DIGITAL, &digital));
        assert!(!check_timer_record_source(timer_source::ANALOGUE, &digital));

        let mut plug = info.to_vec();
        plug.extend_from_slice(&[EXTERNAL_SPECIFIER_PLUG, 3]);
        assert!(check_timer_record_source(timer_source::EXTERNAL, &plug));

        let mut phys = info.to_vec();
        phys.extend_from_slice(&[EXTERNAL_SPECIFIER_PHYSICAL_ADDRESS, 0x10, 0x00]);
        assert!(check_timer_record_source(timer_source::EXTERNAL, &phys));

        let mut bad = info.to_vec();
        bad.extend_from_slice(&[7, 0x10, 0x00]);
        assert!(!check_timer_record_source(timer_source::EXTERNAL, &bad));
        assert!(!check_timer_record_source(timer_source::DIGITAL, &info[..3]));
    }
}
