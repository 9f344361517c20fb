//! Recording actions of the TV

use tracing::{debug, warn};

use super::scheduler::millis;
use super::{FeatureAction, Step};
use crate::device::{LocalDevice, TvController};
use crate::protocol::constants::{opcode, timer_source};
use crate::protocol::message::{
    build_record_on, build_set_analog_timer, build_set_digital_timer, build_set_external_timer,
};
use crate::protocol::{CecMessage, LogicalAddress, RecordResult, TimerRecordingResult};

const STATE_WAITING_FOR_RECORD_STATUS: u32 = 1;
const STATE_WAITING_FOR_TIMER_STATUS: u32 = 1;

/// Recorders may take a while to spin up
const RECORD_STATUS_TIMEOUT_MS: u64 = 120_000;
const TIMER_STATUS_TIMEOUT_MS: u64 = 120_000;

/// Ask a recorder to record a source, report its `<Record Status>`
#[derive(Debug)]
pub struct OneTouchRecord {
    recorder: LogicalAddress,
    source: Vec<u8>,
}

impl OneTouchRecord {
    pub fn new(recorder: LogicalAddress, source: Vec<u8>) -> Self {
        Self { recorder, source }
    }

    pub fn recorder_address(&self) -> LogicalAddress {
        self.recorder
    }
}

impl FeatureAction<TvController> for OneTouchRecord {
    fn start(&mut self, tv: &mut TvController) -> Step {
        let request = build_record_on(tv.address(), self.recorder, &self.source);
        if !tv.send(&request).is_success() {
            warn!(recorder = %self.recorder, "<Record On> not acknowledged");
            tv.announce_record_result(RecordResult::CheckRecorderConnection);
            return Step::Finished;
        }
        Step::wait(
            STATE_WAITING_FOR_RECORD_STATUS,
            millis(RECORD_STATUS_TIMEOUT_MS),
        )
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.opcode != opcode::RECORD_STATUS || message.source != self.recorder {
            return None;
        }
        let status = message.param(0)?;
        debug!(recorder = %self.recorder, status, "Record status");
        tv.announce_record_result(RecordResult::Status(status));
        Some(Step::Finished)
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAITING_FOR_RECORD_STATUS {
            return Step::Continue;
        }
        warn!(recorder = %self.recorder, "No <Record Status>");
        tv.announce_record_result(RecordResult::CheckRecorderConnection);
        Step::Finished
    }
}

/// Program a timer on a recorder, report its `<Timer Status>`
#[derive(Debug)]
pub struct TimerRecording {
    recorder: LogicalAddress,
    source_type: u8,
    source: Vec<u8>,
}

impl TimerRecording {
    pub fn new(recorder: LogicalAddress, source_type: u8, source: Vec<u8>) -> Self {
        Self {
            recorder,
            source_type,
            source,
        }
    }

    fn request_opcode(&self) -> u8 {
        match self.source_type {
            timer_source::DIGITAL => opcode::SET_DIGITAL_TIMER,
            timer_source::ANALOGUE => opcode::SET_ANALOG_TIMER,
            _ => opcode::SET_EXTERNAL_TIMER,
        }
    }

    fn fail(&self, tv: &mut TvController) -> Step {
        tv.announce_timer_result(TimerRecordingResult::CheckRecorderConnection);
        Step::Finished
    }
}

impl FeatureAction<TvController> for TimerRecording {
    fn start(&mut self, tv: &mut TvController) -> Step {
        let me = tv.address();
        let request = match self.source_type {
            timer_source::DIGITAL => build_set_digital_timer(me, self.recorder, &self.source),
            timer_source::ANALOGUE => build_set_analog_timer(me, self.recorder, &self.source),
            _ => build_set_external_timer(me, self.recorder, &self.source),
        };
        if !tv.send(&request).is_success() {
            warn!(recorder = %self.recorder, "Timer request not acknowledged");
            return self.fail(tv);
        }
        Step::wait(
            STATE_WAITING_FOR_TIMER_STATUS,
            millis(TIMER_STATUS_TIMEOUT_MS),
        )
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.source != self.recorder {
            return None;
        }
        match message.opcode {
            opcode::TIMER_STATUS => {
                // Up to three operand bytes, big-endian
                let status = message
                    .params
                    .iter()
                    .take(3)
                    .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                tv.announce_timer_result(TimerRecordingResult::Status(status));
                Some(Step::Finished)
            }
            opcode::FEATURE_ABORT if message.param(0) == Some(self.request_opcode()) => {
                warn!(recorder = %self.recorder, "Timer request refused");
                Some(self.fail(tv))
            }
            _ => None,
        }
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAITING_FOR_TIMER_STATUS {
            return Step::Continue;
        }
        warn!(recorder = %self.recorder, "No <Timer Status>");
        self.fail(tv)
    }
}
