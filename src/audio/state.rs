//! System audio and ARC state
//!
//! ARC flags are only touched on the service thread. The system audio flag,
//! mute and volume are read by volume key handling on other threads and sit
//! behind a mutex.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::protocol::constants::UNKNOWN_VOLUME;

/// Audio Return Channel state, owned by the TV controller
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArcState {
    /// Physical ARC circuit is up
    pub established: bool,
    /// User/policy toggle for the ARC feature
    pub feature_enabled: bool,
}

impl ArcState {
    /// ARC is usable: enabled and established
    pub fn is_active(&self) -> bool {
        self.feature_enabled && self.established
    }
}

/// Values shared with other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStatus {
    pub system_audio_activated: bool,
    pub mute: bool,
    /// Last AVR volume on the CEC scale, `UNKNOWN_VOLUME` until reported
    pub volume: i32,
}

impl Default for AudioStatus {
    fn default() -> Self {
        Self {
            system_audio_activated: false,
            mute: false,
            volume: UNKNOWN_VOLUME,
        }
    }
}

/// Lock-guarded audio status handle
#[derive(Debug, Clone, Default)]
pub struct SharedAudioStatus {
    inner: Arc<Mutex<AudioStatus>>,
}

impl SharedAudioStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AudioStatus {
        *self.lock()
    }

    pub fn is_system_audio_activated(&self) -> bool {
        self.lock().system_audio_activated
    }

    /// Set the system audio flag. Returns true on an actual transition.
    pub fn set_system_audio_activated(&self, on: bool) -> bool {
        let mut status = self.lock();
        if status.system_audio_activated == on {
            return false;
        }
        status.system_audio_activated = on;
        true
    }

    pub fn set_audio_status(&self, mute: bool, volume: i32) {
        let mut status = self.lock();
        status.mute = mute;
        status.volume = volume;
    }

    fn lock(&self) -> MutexGuard<'_, AudioStatus> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
