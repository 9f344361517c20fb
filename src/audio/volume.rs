//! Volume scale conversion
//!
//! The AVR reports volume on the CEC 0..=100 scale; the local audio stack has
//! its own maximum.

use crate::protocol::constants::MAX_CEC_VOLUME;

/// Local volume to CEC scale
pub fn scale_to_cec_volume(volume: i32, max_volume: i32) -> i32 {
    if max_volume <= 0 {
        return 0;
    }
    volume * MAX_CEC_VOLUME / max_volume
}

/// CEC scale to local volume
pub fn scale_to_custom_volume(volume: i32, max_volume: i32) -> i32 {
    volume * max_volume / MAX_CEC_VOLUME
}
