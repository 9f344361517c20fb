//! Bus discovery actions of the TV
//!
//! - [`DeviceDiscovery`] polls every remote address once after address
//!   allocation and collects physical address, OSD name and vendor id of
//!   each device that answers.
//! - [`HotplugDetection`] re-polls the bus periodically (or on a hotplug
//!   event) and reconciles the registry with the devices that still answer.
//! - [`NewDevice`] completes the record of a single device that announced
//!   itself with `<Report Physical Address>`.

use std::time::Duration;

use tracing::{debug, info};

use super::scheduler::millis;
use super::{FeatureAction, Step};
use crate::device::{LocalDevice, TvController};
use crate::protocol::address::format_path;
use crate::protocol::constants::{opcode, UNKNOWN_VENDOR_ID};
use crate::protocol::message::{
    build_give_device_vendor_id, build_give_osd_name, build_give_physical_address,
};
use crate::protocol::{CecMessage, DeviceType, LogicalAddress, PhysicalAddress, PortId};
use crate::registry::DeviceInfo;

const DISCOVERY_TIMEOUT_MS: u64 = 2_000;
const DISCOVERY_TIMEOUT_RETRY: u32 = 5;
const NEW_DEVICE_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    PhysicalAddress,
    OsdName,
    VendorId,
}

impl Stage {
    fn state(self) -> u32 {
        match self {
            Stage::PhysicalAddress => 1,
            Stage::OsdName => 2,
            Stage::VendorId => 3,
        }
    }

    fn request_opcode(self) -> u8 {
        match self {
            Stage::PhysicalAddress => opcode::GIVE_PHYSICAL_ADDRESS,
            Stage::OsdName => opcode::GIVE_OSD_NAME,
            Stage::VendorId => opcode::GIVE_DEVICE_VENDOR_ID,
        }
    }

    fn next(self) -> Option<Stage> {
        match self {
            Stage::PhysicalAddress => Some(Stage::OsdName),
            Stage::OsdName => Some(Stage::VendorId),
            Stage::VendorId => None,
        }
    }

    fn request(self, src: LogicalAddress, dst: LogicalAddress) -> CecMessage {
        match self {
            Stage::PhysicalAddress => build_give_physical_address(src, dst),
            Stage::OsdName => build_give_osd_name(src, dst),
            Stage::VendorId => build_give_device_vendor_id(src, dst),
        }
    }
}

#[derive(Debug)]
struct Discovered {
    logical_address: LogicalAddress,
    physical_address: Option<PhysicalAddress>,
    port_id: Option<PortId>,
    device_type: DeviceType,
    vendor_id: u32,
    display_name: Option<String>,
}

impl Discovered {
    fn new(logical_address: LogicalAddress) -> Self {
        Self {
            logical_address,
            physical_address: None,
            port_id: None,
            device_type: logical_address.device_type(),
            vendor_id: UNKNOWN_VENDOR_ID,
            display_name: None,
        }
    }

    fn into_info(self) -> Option<DeviceInfo> {
        let physical_address = self.physical_address?;
        let name = self
            .display_name
            .unwrap_or_else(|| DeviceInfo::default_name(self.logical_address));
        Some(DeviceInfo::new(
            self.logical_address,
            physical_address,
            self.port_id,
            self.device_type,
            self.vendor_id,
            name,
        ))
    }
}

/// Poll the bus and collect a record for every device that answers
#[derive(Debug)]
pub struct DeviceDiscovery {
    local: Vec<LogicalAddress>,
    devices: Vec<Discovered>,
    stage: Stage,
    index: usize,
    retries: u32,
}

impl DeviceDiscovery {
    pub fn new(local: Vec<LogicalAddress>) -> Self {
        Self {
            local,
            devices: Vec::new(),
            stage: Stage::PhysicalAddress,
            index: 0,
            retries: 0,
        }
    }

    /// Send the current stage's request to the next device, moving through
    /// stages as they complete
    fn query(&mut self, tv: &mut TvController) -> Step {
        loop {
            if self.index >= self.devices.len() {
                match self.stage.next() {
                    Some(stage) => {
                        self.stage = stage;
                        self.index = 0;
                        continue;
                    }
                    None => return self.finish(tv),
                }
            }

            let device = &self.devices[self.index];
            // Devices that never reported a physical address are dropped
            if self.stage != Stage::PhysicalAddress && device.physical_address.is_none() {
                self.index += 1;
                continue;
            }
            let request = self.stage.request(tv.address(), device.logical_address);
            if tv.send(&request).is_success() {
                return Step::wait(self.stage.state(), millis(DISCOVERY_TIMEOUT_MS));
            }
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        self.retries = 0;
    }

    fn finish(&mut self, tv: &mut TvController) -> Step {
        let found: Vec<DeviceInfo> = self
            .devices
            .drain(..)
            .filter_map(Discovered::into_info)
            .collect();
        info!(found = found.len(), "Device discovery finished");
        tv.on_device_discovery_done(found);
        Step::Finished
    }
}

impl FeatureAction<TvController> for DeviceDiscovery {
    fn start(&mut self, tv: &mut TvController) -> Step {
        let me = tv.address();
        self.devices = LogicalAddress::REMOTE_CANDIDATES
            .iter()
            .copied()
            .filter(|address| !self.local.contains(address))
            .filter(|&address| tv.context().poll(me, address).is_success())
            .map(Discovered::new)
            .collect();
        debug!(acked = self.devices.len(), "Polled remote addresses");
        self.query(tv)
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        let device = self.devices.get_mut(self.index)?;
        if message.source != device.logical_address {
            return None;
        }
        match (self.stage, message.opcode) {
            (Stage::PhysicalAddress, opcode::REPORT_PHYSICAL_ADDRESS) => {
                let path = message.physical_address()?;
                device.physical_address = Some(path);
                device.port_id = tv.ports().path_to_port_id(path);
                if let Some(device_type) = message.param(2) {
                    device.device_type = DeviceType::from_u8(device_type);
                }
            }
            (Stage::OsdName, opcode::SET_OSD_NAME) => {
                device.display_name = message.ascii_params();
            }
            (Stage::VendorId, opcode::DEVICE_VENDOR_ID) => {
                device.vendor_id = message.vendor_id().unwrap_or(UNKNOWN_VENDOR_ID);
            }
            (stage, opcode::FEATURE_ABORT) if message.param(0) == Some(stage.request_opcode()) => {
                debug!(device = %device.logical_address, ?stage, "Request aborted");
            }
            _ => return None,
        }
        self.advance();
        Some(self.query(tv))
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != self.stage.state() {
            return Step::Continue;
        }
        self.retries += 1;
        if self.retries >= DISCOVERY_TIMEOUT_RETRY {
            self.advance();
        }
        self.query(tv)
    }
}

const STATE_WAIT_FOR_NEXT_POLLING: u32 = 1;

/// Periodic presence check of every remote address. Never finishes.
#[derive(Debug)]
pub struct HotplugDetection {
    local: Vec<LogicalAddress>,
    interval: Duration,
}

impl HotplugDetection {
    pub fn new(local: Vec<LogicalAddress>, interval: Duration) -> Self {
        Self { local, interval }
    }

    /// Poll right away and restart the polling period
    pub fn poll_all_devices_now(&mut self, tv: &mut TvController) -> Step {
        self.poll_all_devices(tv);
        Step::wait(STATE_WAIT_FOR_NEXT_POLLING, self.interval)
    }

    fn poll_all_devices(&self, tv: &mut TvController) {
        let me = tv.address();
        let acked: Vec<LogicalAddress> = LogicalAddress::REMOTE_CANDIDATES
            .iter()
            .copied()
            .filter(|address| !self.local.contains(address))
            .filter(|&address| tv.context().poll(me, address).is_success())
            .collect();

        let gone: Vec<DeviceInfo> = tv
            .device_info_list(false)
            .into_iter()
            .filter(|info| !acked.contains(&info.logical_address))
            .collect();
        for info in gone {
            remove_device(tv, &info);
        }

        for address in acked {
            if tv.device_info_of(address).is_none() {
                debug!(device = %address, "New device answered the poll");
                tv.send(&build_give_physical_address(me, address));
            }
        }
    }
}

fn remove_device(tv: &mut TvController, info: &DeviceInfo) {
    info!(
        device = %info.logical_address,
        path = %format_path(info.physical_address),
        "Device disappeared"
    );
    tv.handle_remove_active_routing_path(info.physical_address);
    tv.cancel_actions_for_removed_device(info.logical_address);
    tv.remove_cec_device(info.logical_address);
}

impl FeatureAction<TvController> for HotplugDetection {
    fn start(&mut self, _tv: &mut TvController) -> Step {
        Step::wait(STATE_WAIT_FOR_NEXT_POLLING, self.interval)
    }

    fn process_command(&mut self, _tv: &mut TvController, _message: &CecMessage) -> Option<Step> {
        None
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        if state != STATE_WAIT_FOR_NEXT_POLLING {
            return Step::Continue;
        }
        self.poll_all_devices_now(tv)
    }
}

const STATE_WAITING_FOR_OSD_NAME: u32 = 1;
const STATE_WAITING_FOR_VENDOR_ID: u32 = 2;

/// Complete the record of a device that reported its physical address
#[derive(Debug)]
pub struct NewDevice {
    logical_address: LogicalAddress,
    physical_address: PhysicalAddress,
    display_name: Option<String>,
    vendor_id: u32,
    state: u32,
}

impl NewDevice {
    pub fn new(logical_address: LogicalAddress, physical_address: PhysicalAddress) -> Self {
        Self {
            logical_address,
            physical_address,
            display_name: None,
            vendor_id: UNKNOWN_VENDOR_ID,
            state: 0,
        }
    }

    pub fn is_action_of(
        &self,
        logical_address: LogicalAddress,
        physical_address: PhysicalAddress,
    ) -> bool {
        self.logical_address == logical_address && self.physical_address == physical_address
    }

    fn request_osd_name(&mut self, tv: &mut TvController) -> Step {
        let cached = tv
            .message_cache()
            .get_message(self.logical_address, opcode::SET_OSD_NAME)
            .map(CecMessage::ascii_params);
        if let Some(name) = cached {
            self.display_name = name;
            return self.request_vendor_id(tv);
        }
        self.state = STATE_WAITING_FOR_OSD_NAME;
        if !tv
            .send(&build_give_osd_name(tv.address(), self.logical_address))
            .is_success()
        {
            return self.request_vendor_id(tv);
        }
        Step::wait(self.state, millis(NEW_DEVICE_TIMEOUT_MS))
    }

    fn request_vendor_id(&mut self, tv: &mut TvController) -> Step {
        let cached = tv
            .message_cache()
            .get_message(self.logical_address, opcode::DEVICE_VENDOR_ID)
            .and_then(CecMessage::vendor_id);
        if let Some(vendor_id) = cached {
            self.vendor_id = vendor_id;
            return self.add_device_info(tv);
        }
        self.state = STATE_WAITING_FOR_VENDOR_ID;
        if !tv
            .send(&build_give_device_vendor_id(tv.address(), self.logical_address))
            .is_success()
        {
            return self.add_device_info(tv);
        }
        Step::wait(self.state, millis(NEW_DEVICE_TIMEOUT_MS))
    }

    fn add_device_info(&mut self, tv: &mut TvController) -> Step {
        let name = self
            .display_name
            .take()
            .unwrap_or_else(|| DeviceInfo::default_name(self.logical_address));
        let info = DeviceInfo::new(
            self.logical_address,
            self.physical_address,
            tv.ports().path_to_port_id(self.physical_address),
            self.logical_address.device_type(),
            self.vendor_id,
            name,
        );
        tv.add_cec_device(info);

        if self.logical_address.device_type() == DeviceType::AudioSystem {
            if tv.system_audio_mode_setting() {
                tv.start_system_audio_auto_initiation(self.logical_address);
            }
            if tv.arc().feature_enabled {
                tv.start_arc_action(true);
            }
        }
        Step::Finished
    }
}

impl FeatureAction<TvController> for NewDevice {
    fn start(&mut self, tv: &mut TvController) -> Step {
        self.request_osd_name(tv)
    }

    fn process_command(&mut self, tv: &mut TvController, message: &CecMessage) -> Option<Step> {
        if message.source != self.logical_address {
            return None;
        }
        match (self.state, message.opcode) {
            (STATE_WAITING_FOR_OSD_NAME, opcode::SET_OSD_NAME) => {
                self.display_name = message.ascii_params();
                Some(self.request_vendor_id(tv))
            }
            (STATE_WAITING_FOR_VENDOR_ID, opcode::DEVICE_VENDOR_ID) => {
                if let Some(vendor_id) = message.vendor_id() {
                    self.vendor_id = vendor_id;
                }
                Some(self.add_device_info(tv))
            }
            (STATE_WAITING_FOR_OSD_NAME, opcode::FEATURE_ABORT)
                if message.param(0) == Some(opcode::GIVE_OSD_NAME) =>
            {
                Some(self.request_vendor_id(tv))
            }
            (STATE_WAITING_FOR_VENDOR_ID, opcode::FEATURE_ABORT)
                if message.param(0) == Some(opcode::GIVE_DEVICE_VENDOR_ID) =>
            {
                Some(self.add_device_info(tv))
            }
            _ => None,
        }
    }

    fn handle_timer_event(&mut self, tv: &mut TvController, state: u32) -> Step {
        match state {
            STATE_WAITING_FOR_OSD_NAME => self.request_vendor_id(tv),
            STATE_WAITING_FOR_VENDOR_ID => self.add_device_info(tv),
            _ => Step::Continue,
        }
    }
}
