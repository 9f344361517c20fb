//! One-touch and timer recording

use tracing::{info, warn};

use super::TvController;
use crate::action::record::{OneTouchRecord, TimerRecording};
use crate::action::{ActionHost, TvAction, TvActionKind};
use crate::device::LocalDevice;
use crate::event::CecEvent;
use crate::protocol::constants::timer_source;
use crate::protocol::message::{
    build_clear_analog_timer, build_clear_digital_timer, build_clear_external_timer,
    build_record_off,
};
use crate::protocol::record::{check_record_source, check_timer_record_source};
use crate::protocol::{DeviceType, LogicalAddress, RecordResult, TimerRecordingResult};

impl TvController {
    /// Ask a recorder to record what the TV shows. Results are announced.
    pub fn start_one_touch_record(&mut self, recorder: LogicalAddress, source: Option<Vec<u8>>) {
        if !self.ctx.is_control_enabled() {
            warn!("Cannot start one touch record: CEC control is disabled");
            self.announce_record_result(RecordResult::CecDisabled);
            return;
        }
        if !self.check_recorder(recorder) {
            warn!(recorder = %recorder, "Invalid recorder address");
            self.announce_record_result(RecordResult::CheckRecorderConnection);
            return;
        }
        let Some(source) = source.filter(|bytes| check_record_source(bytes)) else {
            warn!(recorder = %recorder, "Invalid record source");
            self.announce_record_result(RecordResult::FailToRecordDisplayedScreen);
            return;
        };

        if let Some(running) = self.running_one_touch_recorder() {
            if running != recorder {
                self.announce_record_result(RecordResult::PreviousRecordingInProgress);
            }
            self.remove_action(TvActionKind::OneTouchRecord);
        }

        info!(recorder = %recorder, source = ?source, "Starting one touch record");
        self.add_and_start_action(TvAction::OneTouchRecord(OneTouchRecord::new(
            recorder, source,
        )));
    }

    pub fn stop_one_touch_record(&mut self, recorder: LogicalAddress) {
        if !self.ctx.is_control_enabled() {
            warn!("Cannot stop one touch record: CEC control is disabled");
            self.announce_record_result(RecordResult::CecDisabled);
            return;
        }
        if !self.check_recorder(recorder) {
            warn!(recorder = %recorder, "Invalid recorder address");
            self.announce_record_result(RecordResult::CheckRecorderConnection);
            return;
        }

        self.remove_action(TvActionKind::OneTouchRecord);
        self.send(&build_record_off(self.address, recorder));
        info!(recorder = %recorder, "Stopped one touch record");
    }

    pub fn start_timer_recording(
        &mut self,
        recorder: LogicalAddress,
        source_type: u8,
        source: Option<Vec<u8>>,
    ) {
        let Some(source) = self.validate_timer_request(recorder, source_type, source) else {
            return;
        };
        self.remove_action(TvActionKind::TimerRecording);
        info!(recorder = %recorder, source_type, "Starting timer recording");
        self.add_and_start_action(TvAction::TimerRecording(TimerRecording::new(
            recorder,
            source_type,
            source,
        )));
    }

    /// Cancel a timer previously programmed on a recorder
    pub fn clear_timer_recording(
        &mut self,
        recorder: LogicalAddress,
        source_type: u8,
        source: Option<Vec<u8>>,
    ) {
        let Some(source) = self.validate_timer_request(recorder, source_type, source) else {
            return;
        };
        let message = match source_type {
            timer_source::DIGITAL => build_clear_digital_timer(self.address, recorder, &source),
            timer_source::ANALOGUE => build_clear_analog_timer(self.address, recorder, &source),
            _ => build_clear_external_timer(self.address, recorder, &source),
        };
        if !self.send(&message).is_success() {
            self.announce_timer_result(TimerRecordingResult::CheckRecorderConnection);
        }
    }

    fn validate_timer_request(
        &mut self,
        recorder: LogicalAddress,
        source_type: u8,
        source: Option<Vec<u8>>,
    ) -> Option<Vec<u8>> {
        if !self.ctx.is_control_enabled() {
            warn!("Cannot handle timer recording: CEC control is disabled");
            self.announce_timer_result(TimerRecordingResult::CecDisabled);
            return None;
        }
        if !self.check_recorder(recorder) {
            warn!(recorder = %recorder, "Invalid recorder address");
            self.announce_timer_result(TimerRecordingResult::CheckRecorderConnection);
            return None;
        }
        let source = source.filter(|bytes| check_timer_record_source(source_type, bytes));
        if source.is_none() {
            warn!(recorder = %recorder, source_type, "Invalid timer record source");
            self.announce_timer_result(TimerRecordingResult::FailToRecordSelectedSource);
        }
        source
    }

    /// Recorder targeted by the one touch record in flight, if any
    pub(crate) fn running_one_touch_recorder(&self) -> Option<LogicalAddress> {
        self.scheduler_ref()
            .iter_kind(TvActionKind::OneTouchRecord)
            .find_map(|action| match action {
                TvAction::OneTouchRecord(record) => Some(record.recorder_address()),
                _ => None,
            })
    }

    /// Registered and of recorder type
    fn check_recorder(&self, recorder: LogicalAddress) -> bool {
        self.registry.get(recorder).is_some() && recorder.device_type() == DeviceType::Recorder
    }

    pub(crate) fn announce_record_result(&self, result: RecordResult) {
        self.ctx.announce(CecEvent::RecordResult(result));
    }

    pub(crate) fn announce_timer_result(&self, result: TimerRecordingResult) {
        self.ctx.announce(CecEvent::TimerResult(result));
    }
}
