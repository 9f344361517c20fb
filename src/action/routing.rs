//! Input selection actions of the TV

use tracing::{debug, warn};

use super::scheduler::millis;
use super::{ActionHost, Callback, FeatureAction, Step, TvActionKind};
use crate::device::{LocalDevice, TvController};
use crate::protocol::address::{format_path, is_in_active_routing_path};
use crate::protocol::constants::{opcode, ui_command};
use crate::protocol::message::{
    build_give_device_power_status, build_set_stream_path, build_user_control_pressed,
    build_user_control_released,
};
use crate::protocol::{CecMessage, ControlResult, LogicalAddress, PhysicalAddress, PowerStatus};
use crate::registry::DeviceInfo;
use crate::routing::ActiveSource;

const STATE_WAIT_FOR_REPORT_POWER_STATUS: u32 = 1;
const STATE_WAIT_FOR_DEVICE_POWER_ON: u32 = 2;

const TIMEOUT_POWER_STATUS_MS: u64 = 2_000;
const TIMEOUT_POWER_ON_MS: u64 = 5_000;
const MAX_POWER_ON_RETRIES: u32 = 20;

/// Make a device the active source: wake it if needed, then route to it
#[derive(Debug)]
pub struct DeviceSelect {
    target: DeviceInfo,
    callback: Callback,
    power_on_retries: u32,
}

impl DeviceSelect {
    pub fn new(target: DeviceInfo, callback: Callback) -> Self {
        Self {
            target,
            callback,
            power_on_retries: 0,
        }
    }

    pub fn target_address(&self) -> LogicalAddress {
        self.target.logical_address
    }

    fn query_power_status(&mut self, tv: &mut TvController) -> Step {
        let request = build_give_device_power_status(tv.address(), self.target.logical_address);
        if !tv.send(&request).is_success() {
            self.callback.invoke(ControlResult::Communication);
            return Step::Finished;
        }
        Step::wait(
            STATE_WAIT_FOR_REPORT_POWER_STATUS,
            millis(TIMEOUT_POWER_STATUS_MS),
        )
    }

    fn handle_power_status(&mut self, tv: &mut TvController, status: PowerStatus) -> Step {
        match status {
            PowerStatus::On => self.send_set_stream_path(tv),
            PowerStatus::TransientToOn => {
                Step::wait(STATE_WAIT_FOR_DEVICE_POWER_ON, millis(TIMEOUT_POWER_ON_MS))
            }
            PowerStatus::Standby | PowerStatus::TransientToStandby => {
                if self.power_on_retries == 0 {
                    let me = tv.address();
                    let target = self.target.logical_address;
                    tv.send(&build_user_control_pressed(me, target, ui_command::POWER));
                    tv.send(&build_user_control_released(me, target));
                }
                Step::wait(STATE_WAIT_FOR_DEVICE_POWER_ON, millis(TIMEOUT_POWER_ON_MS))
            }
            PowerStatus::Unknown => self.send_set_stream_path(tv),
        }
    }

    fn send_set_stream_path(&mut self, tv: &mut TvController) -> Step {
        let path = self.target.physical_address;
        tv.update_active_source(ActiveSource::new(self.target.logical_address, path));
        tv.update_active_input(path, false);
        tv.send(&build_set_stream_path(tv.address(), path));
        self.callback.invoke(ControlResult::Success);
        Step::Finished
    }
}

impl FeatureAction<TvController> for DeviceSelect {
    fn start(&mut self, tv: &mut TvController) -> Step {
        self.query_power_status(tv)
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.source != self.target.logical_address
            || message.opcode != opcode::REPORT_POWER_STATUS
        {
            return None;
        }
        let status = PowerStatus::from_u8(message.param(0)?);
        Some(self.handle_power_status(tv, status))
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        match state {
            // No answer: the device may not implement power status
            STATE_WAIT_FOR_REPORT_POWER_STATUS => self.send_set_stream_path(tv),
            STATE_WAIT_FOR_DEVICE_POWER_ON => {
                self.power_on_retries += 1;
                if self.power_on_retries > MAX_POWER_ON_RETRIES {
                    warn!(target = %self.target.logical_address, "Device did not power on");
                    self.callback.invoke(ControlResult::Timeout);
                    return Step::Finished;
                }
                self.query_power_status(tv)
            }
            _ => Step::Continue,
        }
    }
}

const STATE_WAIT_FOR_ROUTING_INFORMATION: u32 = 1;
const STATE_WAIT_FOR_POWER_REPORT: u32 = 2;

const TIMEOUT_ROUTING_INFORMATION_MS: u64 = 1_000;
const TIMEOUT_REPORT_POWER_STATUS_MS: u64 = 1_000;

/// Follow `<Routing Information>` from switches until the path settles,
/// then route to whatever sits at the end of it
#[derive(Debug)]
pub struct RoutingControl {
    path: PhysicalAddress,
    query_power: bool,
    callback: Callback,
    state: u32,
}

impl RoutingControl {
    pub fn new(path: PhysicalAddress, query_power: bool, callback: Callback) -> Self {
        Self {
            path,
            query_power,
            callback,
            state: STATE_WAIT_FOR_ROUTING_INFORMATION,
        }
    }

    fn switch_port(&self, tv: &mut TvController) {
        if let Some(port_id) = tv.ports().path_to_port_id(self.path) {
            tv.update_active_port(port_id);
        }
    }

    fn send_set_stream_path(&self, tv: &mut TvController) {
        tv.send(&build_set_stream_path(tv.address(), self.path));
    }

    fn complete(&mut self) -> Step {
        self.callback.invoke(ControlResult::Success);
        Step::Finished
    }
}

impl FeatureAction<TvController> for RoutingControl {
    fn start(&mut self, _tv: &mut TvController) -> Step {
        debug!(path = %format_path(self.path), "Waiting for routing information");
        Step::wait(
            STATE_WAIT_FOR_ROUTING_INFORMATION,
            millis(TIMEOUT_ROUTING_INFORMATION_MS),
        )
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        match (self.state, message.opcode) {
            (STATE_WAIT_FOR_ROUTING_INFORMATION, opcode::ROUTING_INFORMATION) => {
                let path = message.physical_address()?;
                // Ignore reports from another routing change sequence
                if !is_in_active_routing_path(self.path, path) {
                    return Some(Step::Continue);
                }
                self.path = path;
                tv.remove_other_actions(TvActionKind::RoutingControl);
                Some(Step::wait(
                    STATE_WAIT_FOR_ROUTING_INFORMATION,
                    millis(TIMEOUT_ROUTING_INFORMATION_MS),
                ))
            }
            (STATE_WAIT_FOR_POWER_REPORT, opcode::REPORT_POWER_STATUS) => {
                let reporter = tv.registry().find_by_path(self.path)?.logical_address;
                if message.source != reporter {
                    return None;
                }
                let status = PowerStatus::from_u8(message.param(0)?);
                if status.is_on_or_transient_to_on() {
                    self.send_set_stream_path(tv);
                } else {
                    self.switch_port(tv);
                }
                Some(self.complete())
            }
            _ => None,
        }
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        match state {
            STATE_WAIT_FOR_ROUTING_INFORMATION => {
                let device = tv
                    .registry()
                    .find_by_path(self.path)
                    .map(|info| info.logical_address);
                match device {
                    Some(device) if self.query_power => {
                        let request = build_give_device_power_status(tv.address(), device);
                        if tv.send(&request).is_success() {
                            self.state = STATE_WAIT_FOR_POWER_REPORT;
                            return Step::wait(
                                STATE_WAIT_FOR_POWER_REPORT,
                                millis(TIMEOUT_REPORT_POWER_STATUS_MS),
                            );
                        }
                        self.switch_port(tv);
                        self.send_set_stream_path(tv);
                    }
                    Some(_) => {
                        self.switch_port(tv);
                        self.send_set_stream_path(tv);
                    }
                    None => self.switch_port(tv),
                }
                self.complete()
            }
            STATE_WAIT_FOR_POWER_REPORT => {
                self.switch_port(tv);
                self.send_set_stream_path(tv);
                self.complete()
            }
            _ => Step::Continue,
        }
    }
}
