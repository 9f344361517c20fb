//! System audio mode, ARC and volume

use tracing::{debug, info, warn};

use super::TvController;
use crate::action::audio::{
    RequestArc, SetArcTransmissionState, SystemAudio, SystemAudioAutoInitiation,
    SystemAudioStatus, VolumeControl,
};
use crate::action::{ActionHost, Callback, TvAction, TvActionKind};
use crate::audio::{scale_to_cec_volume, scale_to_custom_volume};
use crate::event::CecEvent;
use crate::protocol::{CecMessage, ControlResult, LogicalAddress};
use crate::service::hal::KEY_SYSTEM_AUDIO_ENABLED;

impl TvController {
    /// User request to turn system audio on or off
    pub fn change_system_audio_mode(&mut self, enable: bool, mut callback: Callback) {
        if !self.ctx.is_control_enabled() || self.has_action(TvActionKind::DeviceDiscovery) {
            self.set_system_audio_mode(false, true);
            callback.invoke(ControlResult::IncorrectMode);
            return;
        }
        let Some(avr) = self.avr_info().map(|info| info.logical_address) else {
            self.set_system_audio_mode(false, true);
            callback.invoke(ControlResult::TargetNotAvailable);
            return;
        };
        self.add_and_start_action(TvAction::SystemAudioFromTv(SystemAudio::from_tv(
            avr, enable, callback,
        )));
    }

    /// Apply the system audio mode. Listeners hear about transitions only.
    pub fn set_system_audio_mode(&mut self, on: bool, persist: bool) {
        if persist {
            self.ctx.write_bool_setting(KEY_SYSTEM_AUDIO_ENABLED, on);
        }
        self.ctx.set_system_audio_supported(on);
        if self.audio_status.set_system_audio_activated(on) {
            info!(on, "System audio mode changed");
            self.ctx.announce(CecEvent::SystemAudioModeChanged(on));
        }
    }

    /// Active only while an audio system is registered
    pub fn is_system_audio_activated(&self) -> bool {
        self.avr_info().is_some() && self.audio_status.is_system_audio_activated()
    }

    pub fn system_audio_mode_setting(&self) -> bool {
        self.ctx.read_bool_setting(KEY_SYSTEM_AUDIO_ENABLED, false)
    }

    /// Switch the ARC circuit. Returns the previous established state.
    pub fn set_arc_status(&mut self, enabled: bool) -> bool {
        let old = self.arc.established;
        self.ctx.set_audio_return_channel(enabled);
        self.ctx.set_arc_connected(enabled);
        self.arc.established = enabled;
        debug!(enabled, old, "ARC status");
        old
    }

    pub fn is_arc_established(&self) -> bool {
        self.arc.is_active()
    }

    pub fn change_arc_feature_enabled(&mut self, enabled: bool) {
        if self.arc.feature_enabled == enabled {
            return;
        }
        if enabled && !self.arc.established {
            self.start_arc_action(true);
        } else if !enabled && self.arc.established {
            self.start_arc_action(false);
        }
        self.arc.feature_enabled = enabled;
    }

    /// Start ARC initiation or termination, cancelling the opposite one
    pub(crate) fn start_arc_action(&mut self, enable: bool) {
        let Some(avr) = self.avr_info() else {
            return;
        };
        if !self.ports().is_connected_to_arc_port(avr.physical_address) {
            debug!(path = avr.physical_address, "Audio system is not on an ARC port");
            return;
        }
        let avr = avr.logical_address;

        let (opposite, own) = if enable {
            (
                TvActionKind::RequestArcTermination,
                TvActionKind::RequestArcInitiation,
            )
        } else {
            (
                TvActionKind::RequestArcInitiation,
                TvActionKind::RequestArcTermination,
            )
        };
        self.remove_action(opposite);
        if self.has_action(own) {
            return;
        }
        let action = if enable {
            TvAction::RequestArcInitiation(RequestArc::initiation(avr))
        } else {
            TvAction::RequestArcTermination(RequestArc::termination(avr))
        };
        self.add_and_start_action(action);
    }

    /// Store an AVR report and mirror it on the local volume scale
    pub fn set_audio_status(&mut self, mute: bool, volume: i32) {
        self.audio_status.set_audio_status(mute, volume);
        let max = self.ctx.max_volume();
        self.ctx.set_audio_status(mute, scale_to_custom_volume(volume, max));
    }

    /// Volume key handling while system audio is on
    pub fn change_volume(&mut self, current: i32, delta: i32, max_volume: i32) {
        if delta == 0 || !self.is_system_audio_activated() {
            return;
        }
        let cec_volume = scale_to_cec_volume(current + delta, max_volume);
        let last = self.audio_status.get().volume;
        if cec_volume == last {
            self.ctx
                .set_audio_status(false, scale_to_custom_volume(last, max_volume));
            return;
        }

        self.remove_action(TvActionKind::VolumeControl);
        let Some(avr) = self.avr_info().map(|info| info.logical_address) else {
            return;
        };
        self.add_and_start_action(TvAction::VolumeControl(VolumeControl::volume_change(
            avr,
            cec_volume,
            delta > 0,
        )));
    }

    pub fn change_mute(&mut self, mute: bool) {
        if !self.is_system_audio_activated() {
            return;
        }
        self.remove_action(TvActionKind::VolumeControl);
        let Some(avr) = self.avr_info().map(|info| info.logical_address) else {
            return;
        };
        self.add_and_start_action(TvAction::VolumeControl(VolumeControl::mute(avr, mute)));
    }

    /// System audio messages must come from the registered audio system
    pub(super) fn is_message_for_system_audio(&self, message: &CecMessage) -> bool {
        if message.source != LogicalAddress::AudioSystem
            || message.destination != LogicalAddress::Tv
            || self.avr_info().is_none()
        {
            warn!(%message, "Skipping abnormal system audio message");
            return false;
        }
        true
    }

    pub(crate) fn start_system_audio_auto_initiation(&mut self, avr: LogicalAddress) {
        self.add_and_start_action(TvAction::SystemAudioAutoInitiation(
            SystemAudioAutoInitiation::new(avr),
        ));
    }

    pub(crate) fn start_system_audio_status(&mut self, avr: LogicalAddress) {
        self.remove_action(TvActionKind::SystemAudioStatus);
        self.add_and_start_action(TvAction::SystemAudioStatus(SystemAudioStatus::new(
            avr,
            Callback::none(),
        )));
    }

    pub(super) fn start_arc_transmission(&mut self, avr: LogicalAddress, enabled: bool) {
        self.add_and_start_action(TvAction::SetArcTransmissionState(
            SetArcTransmissionState::new(avr, enabled),
        ));
    }

    pub(super) fn disable_system_audio_if_exist(&mut self) {
        if self.avr_info().is_none() {
            return;
        }
        for kind in [
            TvActionKind::SystemAudioFromAvr,
            TvActionKind::SystemAudioFromTv,
            TvActionKind::SystemAudioAutoInitiation,
            TvActionKind::SystemAudioStatus,
            TvActionKind::VolumeControl,
        ] {
            self.remove_action(kind);
        }
        // Keep the setting so the mode comes back on the next boot
        self.set_system_audio_mode(false, false);
    }

    pub(super) fn disable_arc_if_exist(&mut self) {
        let Some(avr) = self.avr_info().map(|info| info.logical_address) else {
            return;
        };
        self.remove_action(TvActionKind::RequestArcInitiation);
        if !self.has_action(TvActionKind::RequestArcTermination) && self.is_arc_established() {
            self.add_and_start_action(TvAction::RequestArcTermination(RequestArc::termination(
                avr,
            )));
        }
    }
}
