//! System audio, ARC and volume actions of the TV

use tracing::{debug, info, warn};

use super::scheduler::millis;
use super::{ActionHost, Callback, FeatureAction, Step, TvAction, TvActionKind};
use crate::device::{LocalDevice, TvController};
use crate::protocol::constants::{abort_reason, opcode, ui_command, UNKNOWN_VOLUME};
use crate::protocol::message::{
    build_feature_abort, build_give_audio_status, build_give_system_audio_mode_status,
    build_report_arc_initiated, build_report_arc_terminated, build_request_arc_initiation,
    build_request_arc_termination, build_system_audio_mode_request, build_user_control_pressed,
    build_user_control_released,
};
use crate::protocol::{CecMessage, ControlResult, DeviceType, LogicalAddress};

const TIMEOUT_MS: u64 = 2_000;

fn is_feature_abort_of(message: &CecMessage, from: LogicalAddress, failed_opcode: u8) -> bool {
    message.opcode == opcode::FEATURE_ABORT
        && message.source == from
        && message.param(0) == Some(failed_opcode)
}

fn system_audio_status_param(message: &CecMessage) -> bool {
    message.param(0) == Some(1)
}

fn send_user_control_pressed_and_released(tv: &TvController, target: LogicalAddress, key: u8) {
    tv.send(&build_user_control_pressed(tv.address(), target, key));
    tv.send(&build_user_control_released(tv.address(), target));
}

const STATE_WAIT_FOR_ARC_RESPONSE: u32 = 1;

/// Ask the audio system to start or stop ARC
#[derive(Debug)]
pub struct RequestArc {
    avr: LogicalAddress,
    initiate: bool,
}

impl RequestArc {
    pub fn initiation(avr: LogicalAddress) -> Self {
        Self {
            avr,
            initiate: true,
        }
    }

    pub fn termination(avr: LogicalAddress) -> Self {
        Self {
            avr,
            initiate: false,
        }
    }

    fn request_opcode(&self) -> u8 {
        if self.initiate {
            opcode::REQUEST_ARC_INITIATION
        } else {
            opcode::REQUEST_ARC_TERMINATION
        }
    }

    fn disable_arc_transmission(&self, tv: &mut TvController) -> Step {
        tv.set_arc_status(false);
        Step::Finished
    }
}

impl FeatureAction<TvController> for RequestArc {
    fn start(&mut self, tv: &mut TvController) -> Step {
        let request = if self.initiate {
            build_request_arc_initiation(tv.address(), self.avr)
        } else {
            build_request_arc_termination(tv.address(), self.avr)
        };
        if !tv.send(&request).is_success() {
            warn!(avr = %self.avr, initiate = self.initiate, "ARC request not acknowledged");
            return self.disable_arc_transmission(tv);
        }
        Step::wait(STATE_WAIT_FOR_ARC_RESPONSE, millis(TIMEOUT_MS))
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if !is_feature_abort_of(message, self.avr, self.request_opcode()) {
            return None;
        }
        Some(self.disable_arc_transmission(tv))
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_ARC_RESPONSE {
            return Step::Continue;
        }
        debug!(avr = %self.avr, "No answer to ARC request");
        self.disable_arc_transmission(tv)
    }
}

/// Answer `<Initiate ARC>` / `<Terminate ARC>` from the audio system
#[derive(Debug)]
pub struct SetArcTransmissionState {
    avr: LogicalAddress,
    enabled: bool,
}

impl SetArcTransmissionState {
    pub fn new(avr: LogicalAddress, enabled: bool) -> Self {
        Self { avr, enabled }
    }
}

impl FeatureAction<TvController> for SetArcTransmissionState {
    fn start(&mut self, tv: &mut TvController) -> Step {
        if !self.enabled {
            tv.set_arc_status(false);
            tv.send(&build_report_arc_terminated(tv.address(), self.avr));
            return Step::Finished;
        }

        if self.avr.device_type() != DeviceType::AudioSystem {
            warn!(avr = %self.avr, "ARC initiated by a device that is not an audio system");
            tv.set_arc_status(false);
            return Step::Finished;
        }
        // Circuit up before the report
        tv.set_arc_status(true);
        if !tv
            .send(&build_report_arc_initiated(tv.address(), self.avr))
            .is_success()
        {
            warn!(avr = %self.avr, "<Report ARC Initiated> not acknowledged");
            tv.set_arc_status(false);
        }
        Step::Finished
    }

    fn process_command(&mut self, _tv: &mut TvController, _message: &CecMessage) -> Option<Step> {
        None
    }

    fn handle_timer_event(&mut self, _tv: &mut TvController, _state: u32) -> Step {
        Step::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Tv,
    Avr,
}

const STATE_WAIT_FOR_SET_SYSTEM_AUDIO_MODE: u32 = 1;
const MAX_SEND_RETRY: u32 = 2;

/// System audio mode negotiation, started by the TV or by the audio system
#[derive(Debug)]
pub struct SystemAudio {
    avr: LogicalAddress,
    target: bool,
    callback: Callback,
    origin: Origin,
    retries: u32,
}

impl SystemAudio {
    pub fn from_tv(avr: LogicalAddress, target: bool, callback: Callback) -> Self {
        Self::new(avr, target, callback, Origin::Tv)
    }

    pub fn from_avr(avr: LogicalAddress, target: bool, callback: Callback) -> Self {
        Self::new(avr, target, callback, Origin::Avr)
    }

    fn new(avr: LogicalAddress, target: bool, callback: Callback, origin: Origin) -> Self {
        Self {
            avr,
            target,
            callback,
            origin,
            retries: 0,
        }
    }

    /// At most one negotiation at a time: this one wins
    fn remove_system_audio_actions_in_progress(&self, tv: &mut TvController) {
        tv.remove_other_actions(TvActionKind::SystemAudioFromTv);
        tv.remove_other_actions(TvActionKind::SystemAudioFromAvr);
    }

    fn send_system_audio_mode_request(&mut self, tv: &mut TvController) -> Step {
        let path = tv
            .routing()
            .active_source()
            .map(|source| source.physical_address)
            .unwrap_or_else(|| tv.routing().active_path());
        let request = build_system_audio_mode_request(tv.address(), self.avr, path, self.target);
        if !tv.send(&request).is_success() {
            warn!(avr = %self.avr, "<System Audio Mode Request> not acknowledged");
            tv.set_system_audio_mode(false, true);
            return self.finish(ControlResult::TargetNotAvailable);
        }
        Step::wait(STATE_WAIT_FOR_SET_SYSTEM_AUDIO_MODE, millis(TIMEOUT_MS))
    }

    /// Mode is on: follow up with the AVR's volume and mute state
    fn start_audio_status(&mut self, tv: &mut TvController) -> Step {
        tv.start_system_audio_status(self.avr);
        self.finish(ControlResult::Success)
    }

    fn finish(&mut self, result: ControlResult) -> Step {
        self.callback.invoke(result);
        Step::Finished
    }
}

impl FeatureAction<TvController> for SystemAudio {
    fn start(&mut self, tv: &mut TvController) -> Step {
        self.remove_system_audio_actions_in_progress(tv);
        if self.origin == Origin::Tv {
            return self.send_system_audio_mode_request(tv);
        }

        if self.target == tv.is_system_audio_activated() {
            return self.finish(ControlResult::Success);
        }
        if tv.is_prohibit_mode() {
            info!("Refusing system audio mode change in prohibit mode");
            tv.send(&build_feature_abort(
                tv.address(),
                self.avr,
                opcode::SET_SYSTEM_AUDIO_MODE,
                abort_reason::REFUSED,
            ));
            self.target = false;
            return self.send_system_audio_mode_request(tv);
        }

        tv.remove_action(TvActionKind::SystemAudioAutoInitiation);
        tv.set_system_audio_mode(self.target, true);
        if self.target {
            self.start_audio_status(tv)
        } else {
            self.finish(ControlResult::Success)
        }
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if is_feature_abort_of(message, self.avr, opcode::SYSTEM_AUDIO_MODE_REQUEST) {
            tv.set_system_audio_mode(false, true);
            return Some(self.finish(ControlResult::TargetNotAvailable));
        }
        if message.opcode != opcode::SET_SYSTEM_AUDIO_MODE || message.source != self.avr {
            return None;
        }

        let received = system_audio_status_param(message);
        if received == self.target {
            tv.set_system_audio_mode(received, true);
            return Some(self.start_audio_status(tv));
        }
        // The audio system decided otherwise; treat it as its own request
        debug!(received, target = self.target, "Unexpected system audio mode");
        self.target = received;
        tv.set_system_audio_mode(received, true);
        Some(self.finish(ControlResult::Exception))
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_SET_SYSTEM_AUDIO_MODE {
            return Step::Continue;
        }
        if !self.target || self.retries >= MAX_SEND_RETRY {
            tv.set_system_audio_mode(false, true);
            return self.finish(ControlResult::Timeout);
        }
        self.retries += 1;
        self.send_system_audio_mode_request(tv)
    }
}

const STATE_WAIT_FOR_SYSTEM_AUDIO_MODE_STATUS: u32 = 1;

/// Restore the persisted system audio mode once an audio system shows up
#[derive(Debug)]
pub struct SystemAudioAutoInitiation {
    avr: LogicalAddress,
}

impl SystemAudioAutoInitiation {
    pub fn new(avr: LogicalAddress) -> Self {
        Self { avr }
    }

    fn can_change_system_audio(tv: &TvController) -> bool {
        !tv.has_action(TvActionKind::SystemAudioFromTv)
            && !tv.has_action(TvActionKind::SystemAudioFromAvr)
    }

    fn start_from_tv(&self, tv: &mut TvController, target: bool) {
        if Self::can_change_system_audio(tv) {
            tv.add_and_start_action(TvAction::SystemAudioFromTv(SystemAudio::from_tv(
                self.avr,
                target,
                Callback::none(),
            )));
        }
    }
}

impl FeatureAction<TvController> for SystemAudioAutoInitiation {
    fn start(&mut self, tv: &mut TvController) -> Step {
        let request = build_give_system_audio_mode_status(tv.address(), self.avr);
        if !tv.send(&request).is_success() {
            let setting = tv.system_audio_mode_setting();
            self.start_from_tv(tv, setting);
            return Step::Finished;
        }
        Step::wait(STATE_WAIT_FOR_SYSTEM_AUDIO_MODE_STATUS, millis(TIMEOUT_MS))
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.opcode != opcode::SYSTEM_AUDIO_MODE_STATUS || message.source != self.avr {
            return None;
        }
        let current = system_audio_status_param(message);
        let setting = tv.system_audio_mode_setting();
        if current != setting {
            self.start_from_tv(tv, setting);
        } else {
            tv.set_system_audio_mode(current, true);
        }
        Some(Step::Finished)
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_SYSTEM_AUDIO_MODE_STATUS {
            return Step::Continue;
        }
        let setting = tv.system_audio_mode_setting();
        self.start_from_tv(tv, setting);
        Step::Finished
    }
}

const STATE_WAIT_FOR_REPORT_AUDIO_STATUS: u32 = 1;

/// Fetch volume and mute from the audio system
#[derive(Debug)]
pub struct SystemAudioStatus {
    avr: LogicalAddress,
    callback: Callback,
}

impl SystemAudioStatus {
    pub fn new(avr: LogicalAddress, callback: Callback) -> Self {
        Self { avr, callback }
    }

    /// The audio state is unknown: tell the UI and nudge the AVR into the
    /// mode we expect
    fn handle_give_audio_status_failure(&mut self, tv: &mut TvController) -> Step {
        tv.set_audio_status(false, UNKNOWN_VOLUME);
        let key = if tv.is_system_audio_activated() {
            ui_command::RESTORE_VOLUME_FUNCTION
        } else {
            ui_command::MUTE_FUNCTION
        };
        send_user_control_pressed_and_released(tv, self.avr, key);
        self.callback.invoke(ControlResult::Success);
        Step::Finished
    }
}

impl FeatureAction<TvController> for SystemAudioStatus {
    fn start(&mut self, tv: &mut TvController) -> Step {
        if !tv
            .send(&build_give_audio_status(tv.address(), self.avr))
            .is_success()
        {
            return self.handle_give_audio_status_failure(tv);
        }
        Step::wait(STATE_WAIT_FOR_REPORT_AUDIO_STATUS, millis(TIMEOUT_MS))
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.opcode != opcode::REPORT_AUDIO_STATUS || message.source != self.avr {
            return None;
        }
        let status = message.param(0)?;
        tv.set_audio_status(status & 0x80 != 0, i32::from(status & 0x7F));
        self.callback.invoke(ControlResult::Success);
        Some(Step::Finished)
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_REPORT_AUDIO_STATUS {
            return Step::Continue;
        }
        self.handle_give_audio_status_failure(tv)
    }
}

const STATE_WAIT_FOR_REPORT_VOLUME_STATUS: u32 = 1;
const TIMEOUT_VOLUME_MS: u64 = 1_000;
const IRT_MS: u64 = 300;
const MAX_VOLUME_STEPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeRequest {
    Change { target: i32, up: bool },
    Mute(bool),
}

/// Step the AVR volume towards a target, or toggle its mute
#[derive(Debug)]
pub struct VolumeControl {
    avr: LogicalAddress,
    request: VolumeRequest,
    steps: u32,
}

impl VolumeControl {
    pub fn volume_change(avr: LogicalAddress, target: i32, up: bool) -> Self {
        Self {
            avr,
            request: VolumeRequest::Change { target, up },
            steps: 0,
        }
    }

    pub fn mute(avr: LogicalAddress, mute: bool) -> Self {
        Self {
            avr,
            request: VolumeRequest::Mute(mute),
            steps: 0,
        }
    }

    fn send_volume_key(&mut self, tv: &TvController, up: bool) {
        let key = if up {
            ui_command::VOLUME_UP
        } else {
            ui_command::VOLUME_DOWN
        };
        self.steps += 1;
        tv.send(&build_user_control_pressed(tv.address(), self.avr, key));
    }

    fn release(&self, tv: &TvController) -> Step {
        tv.send(&build_user_control_released(tv.address(), self.avr));
        Step::Finished
    }
}

impl FeatureAction<TvController> for VolumeControl {
    fn start(&mut self, tv: &mut TvController) -> Step {
        match self.request {
            VolumeRequest::Mute(mute) => {
                let key = if mute {
                    ui_command::MUTE_FUNCTION
                } else {
                    ui_command::RESTORE_VOLUME_FUNCTION
                };
                send_user_control_pressed_and_released(tv, self.avr, key);
                Step::Finished
            }
            VolumeRequest::Change { up, .. } => {
                self.send_volume_key(tv, up);
                Step::wait(
                    STATE_WAIT_FOR_REPORT_VOLUME_STATUS,
                    millis(TIMEOUT_VOLUME_MS),
                )
            }
        }
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        let VolumeRequest::Change { target, up } = self.request else {
            return None;
        };
        if message.source != self.avr {
            return None;
        }
        match message.opcode {
            opcode::REPORT_AUDIO_STATUS => {
                let volume = i32::from(message.param(0)? & 0x7F);
                tv.set_audio_status(false, volume);
                let reached = if up { volume >= target } else { volume <= target };
                if reached || self.steps >= MAX_VOLUME_STEPS {
                    return Some(self.release(tv));
                }
                self.send_volume_key(tv, up);
                Some(Step::wait(STATE_WAIT_FOR_REPORT_VOLUME_STATUS, millis(IRT_MS)))
            }
            opcode::FEATURE_ABORT if message.param(0) == Some(opcode::USER_CONTROL_PRESSED) => {
                Some(Step::Finished)
            }
            _ => None,
        }
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_REPORT_VOLUME_STATUS {
            return Step::Continue;
        }
        self.release(tv)
    }
}
