//! TV local device
//!
//! The TV is the root of the HDMI tree. Besides answering the common device
//! queries it keeps the registry of every other device, tracks which input
//! is routed, negotiates system audio and ARC with the audio system, and
//! relays recording requests to recorders.
//!
//! The controller is split by concern:
//!
//! - `handlers`: incoming opcode handlers
//! - `routing`: active source, input switching and routing control
//! - `audio`: system audio mode, ARC and volume
//! - `recording`: one-touch and timer recording

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info};

use crate::action::discovery::{DeviceDiscovery, HotplugDetection};
use crate::action::{ActionHost, ActionScheduler, Step, TvAction, TvActionKind};
use crate::audio::{ArcState, SharedAudioStatus};
use crate::device::LocalDevice;
use crate::event::CecEvent;
use crate::protocol::message::{build_device_vendor_id, build_report_physical_address, build_standby};
use crate::protocol::{CecMessage, DeviceType, LogicalAddress, PortId};
use crate::registry::{DeviceInfo, DeviceRegistry, DeviceSnapshot, MessageCache};
use crate::routing::{PortTable, RoutingTracker};
use crate::service::context::ServiceContext;
use crate::service::hal::{KEY_AUTO_DEVICE_OFF_ENABLED, KEY_AUTO_WAKEUP_ENABLED};

mod audio;
mod handlers;
mod recording;
mod routing;

/// TV-side CEC controller. Lives on the service thread only.
pub struct TvController {
    ctx: Rc<ServiceContext>,
    address: LogicalAddress,
    registry: DeviceRegistry,
    routing: RoutingTracker,
    arc: ArcState,
    audio_status: SharedAudioStatus,
    actions: ActionScheduler<TvAction>,
    auto_device_off: bool,
    auto_wakeup: bool,
}

impl TvController {
    pub fn new(
        ctx: Rc<ServiceContext>,
        address: LogicalAddress,
        snapshot: DeviceSnapshot,
        audio_status: SharedAudioStatus,
    ) -> Self {
        let auto_device_off = ctx.read_bool_setting(KEY_AUTO_DEVICE_OFF_ENABLED, true);
        let auto_wakeup = ctx.read_bool_setting(KEY_AUTO_WAKEUP_ENABLED, true);

        let mut registry = DeviceRegistry::with_snapshot(snapshot);
        registry.set_local_addresses(ctx.local_addresses());

        let routing = RoutingTracker::new(PortTable::new(ctx.config().ports.clone()));
        let actions = ActionScheduler::with_stats(Arc::clone(ctx.stats()));

        Self {
            ctx,
            address,
            registry,
            routing,
            arc: ArcState {
                established: false,
                feature_enabled: false,
            },
            audio_status,
            actions,
            auto_device_off,
            auto_wakeup,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn routing(&self) -> &RoutingTracker {
        &self.routing
    }

    pub fn ports(&self) -> &PortTable {
        self.routing.ports()
    }

    pub fn device_info_of(&self, logical_address: LogicalAddress) -> Option<&DeviceInfo> {
        self.registry.get(logical_address)
    }

    /// Registered audio system, if any
    pub fn avr_info(&self) -> Option<&DeviceInfo> {
        self.registry.audio_system()
    }

    pub fn device_info_list(&self, include_local: bool) -> Vec<DeviceInfo> {
        self.registry.device_list(include_local)
    }

    pub fn is_prohibit_mode(&self) -> bool {
        self.ctx.is_prohibit_mode()
    }

    pub fn auto_device_off(&self) -> bool {
        self.auto_device_off
    }

    pub fn auto_wakeup(&self) -> bool {
        self.auto_wakeup
    }

    /// Register a device and announce it (our own address is not announced)
    pub fn add_cec_device(&mut self, info: DeviceInfo) {
        let logical_address = info.logical_address;
        self.registry.add_device(info.clone());
        if logical_address == self.address {
            return;
        }
        self.ctx.announce(CecEvent::DeviceAdded(info));
    }

    /// Remove a device and announce it
    pub fn remove_cec_device(&mut self, logical_address: LogicalAddress) {
        if let Some(info) = self.registry.remove_device(logical_address) {
            self.ctx.announce(CecEvent::DeviceRemoved(info));
        }
    }

    fn clear_device_info_list(&mut self) {
        for info in self.registry.clear() {
            self.ctx.announce(CecEvent::DeviceRemoved(info));
        }
    }

    /// Called once our logical address is claimed on the bus
    pub fn on_address_allocated(&mut self, from_bootup: bool) {
        info!(address = %self.address, "TV address allocated");
        self.registry.set_local_addresses(self.ctx.local_addresses());
        self.send(&build_report_physical_address(
            self.address,
            self.physical_address(),
            DeviceType::Tv,
        ));
        self.send(&build_device_vendor_id(self.address, self.ctx.config().vendor_id));
        self.launch_routing_control(from_bootup);
        self.launch_device_discovery();
    }

    pub fn launch_device_discovery(&mut self) {
        self.clear_device_info_list();
        self.remove_action(TvActionKind::DeviceDiscovery);
        let action = DeviceDiscovery::new(self.ctx.local_addresses());
        self.add_and_start_action(TvAction::DeviceDiscovery(action));
    }

    /// Completion step of device discovery
    pub fn on_device_discovery_done(&mut self, devices: Vec<DeviceInfo>) {
        info!(count = devices.len(), "Device discovery done");
        for info in devices {
            self.add_cec_device(info);
        }
        for address in self.ctx.local_addresses() {
            let info = self.local_device_record(address);
            self.add_cec_device(info);
        }

        let interval = self.ctx.config().hotplug_poll_interval;
        self.add_and_start_action(TvAction::HotplugDetection(HotplugDetection::new(
            self.ctx.local_addresses(),
            interval,
        )));

        if self.audio_status.is_system_audio_activated() {
            if let Some(avr) = self.avr_info().map(|info| info.logical_address) {
                self.start_system_audio_auto_initiation(avr);
                if self.arc.established {
                    self.start_arc_action(true);
                }
            }
        }
    }

    fn local_device_record(&self, address: LogicalAddress) -> DeviceInfo {
        if address == self.address {
            return self.device_info();
        }
        let config = self.ctx.config();
        DeviceInfo::new(
            address,
            self.physical_address(),
            None,
            address.device_type(),
            config.vendor_id,
            config.osd_name.clone(),
        )
    }

    /// Cancel work aimed at a device that left the bus
    pub(crate) fn cancel_actions_for_removed_device(&mut self, address: LogicalAddress) {
        self.actions.remove_matching(TvActionKind::DeviceSelect, |action| {
            matches!(action, TvAction::DeviceSelect(select) if select.target_address() == address)
        });
        self.actions.remove_matching(TvActionKind::OneTouchRecord, |action| {
            matches!(action, TvAction::OneTouchRecord(record) if record.recorder_address() == address)
        });
        if address == LogicalAddress::AudioSystem {
            self.set_system_audio_mode(false, true);
            if self.is_arc_established() {
                self.start_arc_action(false);
            }
        }
    }

    /// A port's hotplug line changed; poll the bus right away
    pub fn on_hotplug(&mut self, port_id: PortId, connected: bool) {
        debug!(port_id, connected, "Hotplug");
        self.drive_action(TvActionKind::HotplugDetection, |action, tv| match action {
            TvAction::HotplugDetection(hotplug) => hotplug.poll_all_devices_now(tv),
            _ => Step::Continue,
        });
    }

    pub fn set_auto_device_off(&mut self, enabled: bool) {
        self.auto_device_off = enabled;
        self.ctx.write_bool_setting(KEY_AUTO_DEVICE_OFF_ENABLED, enabled);
    }

    pub fn set_auto_wakeup(&mut self, enabled: bool) {
        self.auto_wakeup = enabled;
        self.ctx.write_bool_setting(KEY_AUTO_WAKEUP_ENABLED, enabled);
    }

    /// The TV is going to standby
    pub fn on_standby(&mut self, initiated_by_cec: bool) {
        if !self.ctx.is_control_enabled() {
            return;
        }
        if !initiated_by_cec && self.auto_device_off {
            self.send(&build_standby(self.address, LogicalAddress::BROADCAST));
        }
    }

    /// Tear down before standby or when CEC is switched off
    pub fn disable_device(&mut self, initiated_by_cec: bool) {
        debug!(initiated_by_cec, "Disabling TV device");
        for kind in [
            TvActionKind::DeviceDiscovery,
            TvActionKind::HotplugDetection,
            TvActionKind::NewDevice,
            TvActionKind::DeviceSelect,
            TvActionKind::RoutingControl,
            TvActionKind::SendKey,
            TvActionKind::OneTouchRecord,
            TvActionKind::TimerRecording,
        ] {
            self.remove_action(kind);
        }
        self.disable_system_audio_if_exist();
        self.disable_arc_if_exist();
        self.clear_device_info_list();
    }

    pub fn audio_status(&self) -> &SharedAudioStatus {
        &self.audio_status
    }

    pub fn arc(&self) -> ArcState {
        self.arc
    }
}

impl ActionHost for TvController {
    type Action = TvAction;

    fn scheduler(&mut self) -> &mut ActionScheduler<TvAction> {
        &mut self.actions
    }

    fn scheduler_ref(&self) -> &ActionScheduler<TvAction> {
        &self.actions
    }
}

impl LocalDevice for TvController {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn address(&self) -> LogicalAddress {
        self.address
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Tv
    }

    fn message_cache(&mut self) -> &mut MessageCache {
        self.registry.cache_mut()
    }

    fn handle_message(&mut self, message: &CecMessage) -> bool {
        self.handle_tv_message(message)
    }
}
