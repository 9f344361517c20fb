//! State shared by the local devices of one service
//!
//! The context lives on the service thread behind an `Rc`. Interior
//! mutability is `Cell`/`RefCell`, so neither the context nor the controllers
//! holding it can cross threads.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use tracing::{debug, warn};

use super::config::CecConfig;
use super::hal::{
    AudioSystem, CecTransport, Collaborators, PowerControl, RecordRequestListener, SendResult,
    SettingsStore, KEY_CONTROL_ENABLED,
};
use crate::event::{CecEvent, EventBus};
use crate::protocol::{CecMessage, LogicalAddress, PhysicalAddress, PowerStatus};
use crate::stats::ServiceStats;

pub struct ServiceContext {
    config: CecConfig,
    transport: RefCell<Box<dyn CecTransport>>,
    settings: RefCell<Box<dyn SettingsStore>>,
    audio: RefCell<Box<dyn AudioSystem>>,
    power: RefCell<Box<dyn PowerControl>>,
    record_requests: RefCell<Option<Box<dyn RecordRequestListener>>>,
    control_enabled: Cell<bool>,
    prohibit_mode: Cell<bool>,
    /// Set when `<Standby>` arrived over the bus, consumed by the next standby
    standby_message_received: Cell<bool>,
    local_addresses: RefCell<Vec<LogicalAddress>>,
    events: EventBus,
    stats: Arc<ServiceStats>,
}

impl ServiceContext {
    pub fn new(
        config: CecConfig,
        collaborators: Collaborators,
        events: EventBus,
        stats: Arc<ServiceStats>,
    ) -> Self {
        let control_enabled = collaborators
            .settings
            .read_bool(KEY_CONTROL_ENABLED, config.control_enabled);
        let prohibit_mode = config.prohibit_mode;
        Self {
            config,
            transport: RefCell::new(collaborators.transport),
            settings: RefCell::new(collaborators.settings),
            audio: RefCell::new(collaborators.audio),
            power: RefCell::new(collaborators.power),
            record_requests: RefCell::new(collaborators.record_requests),
            control_enabled: Cell::new(control_enabled),
            prohibit_mode: Cell::new(prohibit_mode),
            standby_message_received: Cell::new(false),
            local_addresses: RefCell::new(Vec::new()),
            events,
            stats,
        }
    }

    pub fn config(&self) -> &CecConfig {
        &self.config
    }

    pub fn physical_address(&self) -> PhysicalAddress {
        self.config.physical_address
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn announce(&self, event: CecEvent) {
        self.events.publish(event);
    }

    pub fn stats(&self) -> &Arc<ServiceStats> {
        &self.stats
    }

    /// Transmit a message on the bus
    pub fn send_cec_command(&self, message: &CecMessage) -> SendResult {
        let result = self.transport.borrow_mut().send_command(message);
        self.stats.message_sent(result.is_success());
        if result.is_success() {
            debug!(%message, "Sent");
        } else {
            debug!(%message, ?result, "Send not acknowledged");
        }
        result
    }

    /// Probe an address with a polling message
    pub fn poll(&self, source: LogicalAddress, destination: LogicalAddress) -> SendResult {
        self.transport.borrow_mut().poll(source, destination)
    }

    pub fn add_logical_address(&self, address: LogicalAddress) {
        self.transport.borrow_mut().add_logical_address(address);
        let mut locals = self.local_addresses.borrow_mut();
        if !locals.contains(&address) {
            locals.push(address);
        }
    }

    /// Release every claimed address. Returns the ones held before.
    pub fn clear_logical_addresses(&self) -> Vec<LogicalAddress> {
        self.transport.borrow_mut().clear_logical_address();
        std::mem::take(&mut *self.local_addresses.borrow_mut())
    }

    pub fn local_addresses(&self) -> Vec<LogicalAddress> {
        self.local_addresses.borrow().clone()
    }

    pub fn is_local_address(&self, address: LogicalAddress) -> bool {
        self.local_addresses.borrow().contains(&address)
    }

    pub fn set_audio_return_channel(&self, enabled: bool) {
        self.transport.borrow_mut().set_audio_return_channel(enabled);
    }

    pub fn read_bool_setting(&self, key: &str, default: bool) -> bool {
        self.settings.borrow().read_bool(key, default)
    }

    pub fn write_bool_setting(&self, key: &str, value: bool) {
        self.settings.borrow_mut().write_bool(key, value);
    }

    pub fn set_system_audio_supported(&self, on: bool) {
        self.audio.borrow_mut().set_system_audio_supported(on);
    }

    pub fn set_arc_connected(&self, connected: bool) {
        self.audio.borrow_mut().set_arc_connected(connected, "");
    }

    pub fn max_volume(&self) -> i32 {
        self.audio.borrow().max_volume()
    }

    pub fn set_audio_status(&self, mute: bool, volume: i32) {
        self.audio.borrow_mut().set_audio_status(mute, volume);
    }

    pub fn power_status(&self) -> PowerStatus {
        self.power.borrow().power_status()
    }

    pub fn is_power_standby_or_transient(&self) -> bool {
        self.power_status().is_standby_or_transient()
    }

    pub fn is_power_on_or_transient(&self) -> bool {
        self.power_status().is_on_or_transient_to_on()
    }

    pub fn wake_up(&self) {
        self.power.borrow_mut().wake_up();
    }

    pub fn standby(&self) {
        self.power.borrow_mut().standby();
    }

    pub fn mark_standby_message_received(&self) {
        self.standby_message_received.set(true);
    }

    /// Whether the pending standby was initiated over CEC. Clears the mark.
    pub fn take_standby_message_received(&self) -> bool {
        self.standby_message_received.replace(false)
    }

    /// Ask the platform for a record source on behalf of a recorder
    pub fn request_record_source(&self, recorder: LogicalAddress) -> Option<Vec<u8>> {
        match self.record_requests.borrow_mut().as_mut() {
            Some(listener) => listener.record_source(recorder),
            None => {
                warn!(recorder = %recorder, "No record request listener registered");
                None
            }
        }
    }

    pub fn is_control_enabled(&self) -> bool {
        self.control_enabled.get()
    }

    pub fn set_control_enabled(&self, enabled: bool) {
        self.control_enabled.set(enabled);
        self.write_bool_setting(KEY_CONTROL_ENABLED, enabled);
    }

    pub fn is_prohibit_mode(&self) -> bool {
        self.prohibit_mode.get()
    }

    pub fn set_prohibit_mode(&self, enabled: bool) {
        self.prohibit_mode.set(enabled);
    }
}
