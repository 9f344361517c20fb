//! System audio mode and Audio Return Channel state

pub mod state;
pub mod volume;

pub use state::{ArcState, AudioStatus, SharedAudioStatus};
pub use volume::{scale_to_cec_volume, scale_to_custom_volume};
