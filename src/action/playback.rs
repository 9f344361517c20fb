//! Actions of a playback device

use tracing::debug;

use super::action_set;
use super::key::SendKey;
use super::scheduler::millis;
use super::{Callback, FeatureAction, Step};
use crate::device::{LocalDevice, PlaybackController};
use crate::protocol::constants::opcode;
use crate::protocol::message::{
    build_active_source, build_give_device_power_status, build_text_view_on,
};
use crate::protocol::{CecMessage, ControlResult, LogicalAddress, PowerStatus};

const STATE_WAITING_FOR_REPORT_POWER_STATUS: u32 = 1;
const POLLING_INTERVAL_MS: u64 = 2_000;
const LOOP_COUNTER_MAX: u32 = 10;

/// Turn the TV on and make ourselves its active source
#[derive(Debug)]
pub struct OneTouchPlay {
    tv: LogicalAddress,
    callback: Callback,
    power_status_counter: u32,
}

impl OneTouchPlay {
    pub fn new(tv: LogicalAddress, callback: Callback) -> Self {
        Self {
            tv,
            callback,
            power_status_counter: 0,
        }
    }

    fn query_power_status(&self, device: &PlaybackController) -> Step {
        device.send(&build_give_device_power_status(device.address(), self.tv));
        Step::wait(
            STATE_WAITING_FOR_REPORT_POWER_STATUS,
            millis(POLLING_INTERVAL_MS),
        )
    }
}

impl FeatureAction<PlaybackController> for OneTouchPlay {
    fn start(&mut self, device: &mut PlaybackController) -> Step {
        let me = device.address();
        device.send(&build_text_view_on(me, self.tv));
        device.send(&build_active_source(me, device.physical_address()));
        device.mark_active_source();
        self.query_power_status(device)
    }

    fn process_command(
        &mut self,
        _device: &mut PlaybackController,
        message: &CecMessage,
    ) -> Option<Step> {
        if message.opcode != opcode::REPORT_POWER_STATUS || message.source != self.tv {
            return None;
        }
        if PowerStatus::from_u8(message.param(0)?) == PowerStatus::On {
            self.callback.invoke(ControlResult::Success);
            return Some(Step::Finished);
        }
        // Keep polling until the display is on
        Some(Step::Continue)
    }

    fn handle_timer_event(&mut self, device: &mut PlaybackController, state: u32) -> Step {
        if state != STATE_WAITING_FOR_REPORT_POWER_STATUS {
            return Step::Continue;
        }
        self.power_status_counter += 1;
        if self.power_status_counter >= LOOP_COUNTER_MAX {
            debug!(tv = %self.tv, "Display did not turn on");
            self.callback.invoke(ControlResult::Timeout);
            return Step::Finished;
        }
        self.query_power_status(device)
    }
}

const TIMEOUT_MS: u64 = 2_000;

/// Query the power status of a device, typically the TV
#[derive(Debug)]
pub struct DevicePowerStatus {
    target: LogicalAddress,
    callback: Callback<Result<PowerStatus, ControlResult>>,
}

impl DevicePowerStatus {
    pub fn new(
        target: LogicalAddress,
        callback: Callback<Result<PowerStatus, ControlResult>>,
    ) -> Self {
        Self { target, callback }
    }
}

impl FeatureAction<PlaybackController> for DevicePowerStatus {
    fn start(&mut self, device: &mut PlaybackController) -> Step {
        let request = build_give_device_power_status(device.address(), self.target);
        if !device.send(&request).is_success() {
            self.callback.invoke(Err(ControlResult::Communication));
            return Step::Finished;
        }
        Step::wait(STATE_WAITING_FOR_REPORT_POWER_STATUS, millis(TIMEOUT_MS))
    }

    fn process_command(
        &mut self,
        _device: &mut PlaybackController,
        message: &CecMessage,
    ) -> Option<Step> {
        if message.opcode != opcode::REPORT_POWER_STATUS || message.source != self.target {
            return None;
        }
        let status = PowerStatus::from_u8(message.param(0)?);
        self.callback.invoke(Ok(status));
        Some(Step::Finished)
    }

    fn handle_timer_event(&mut self, _device: &mut PlaybackController, state: u32) -> Step {
        if state != STATE_WAITING_FOR_REPORT_POWER_STATUS {
            return Step::Continue;
        }
        self.callback.invoke(Ok(PowerStatus::Unknown));
        Step::Finished
    }
}

action_set! {
    /// Actions run by a playback controller
    PlaybackAction, PlaybackActionKind, PlaybackController {
        OneTouchPlay(OneTouchPlay),
        DevicePowerStatus(DevicePowerStatus),
        SendKey(SendKey),
    }
}
