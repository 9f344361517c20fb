//! Collaborator interfaces
//!
//! The service drives the bus and the platform through these traits. All of
//! them are called on the service thread only, so implementations need to be
//! `Send` (to move onto that thread) but not `Sync`.

use crate::protocol::{CecMessage, LogicalAddress, PowerStatus};

/// Settings key: system audio mode persisted across boots
pub const KEY_SYSTEM_AUDIO_ENABLED: &str = "hdmi_system_audio_enabled";
/// Settings key: turn off devices when the TV goes to standby
pub const KEY_AUTO_DEVICE_OFF_ENABLED: &str = "hdmi_control_auto_device_off_enabled";
/// Settings key: wake the TV on `<Text View On>` / `<Image View On>`
pub const KEY_AUTO_WAKEUP_ENABLED: &str = "hdmi_control_auto_wakeup_enabled";
/// Settings key: master CEC switch
pub const KEY_CONTROL_ENABLED: &str = "hdmi_control_enabled";

/// Outcome of a single bus transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Frame acknowledged by the destination (always for broadcast)
    Success,
    /// Nobody acknowledged a directed frame
    Nack,
    /// Bus error or arbitration loss after retries
    Fail,
}

impl SendResult {
    pub fn is_success(self) -> bool {
        self == SendResult::Success
    }
}

/// CEC bus transport
pub trait CecTransport: Send {
    /// Send a frame. Fire-and-forget apart from the acknowledgement result.
    fn send_command(&mut self, message: &CecMessage) -> SendResult;

    /// Send a polling message (header block only) to probe an address
    fn poll(&mut self, source: LogicalAddress, destination: LogicalAddress) -> SendResult;

    /// Claim a logical address in the controller's acceptance filter
    fn add_logical_address(&mut self, address: LogicalAddress);

    /// Drop every claimed logical address
    fn clear_logical_address(&mut self);

    /// Switch the Audio Return Channel circuit
    fn set_audio_return_channel(&mut self, enabled: bool);
}

/// Persistent boolean settings
pub trait SettingsStore: Send {
    fn read_bool(&self, key: &str, default: bool) -> bool;
    fn write_bool(&mut self, key: &str, value: bool);
}

/// Platform audio subsystem
pub trait AudioSystem: Send {
    /// Route audio to (or away from) the external audio system
    fn set_system_audio_supported(&mut self, on: bool);

    /// Report the ARC output as connected or disconnected
    fn set_arc_connected(&mut self, connected: bool, name: &str);

    /// Maximum volume index of the music stream
    fn max_volume(&self) -> i32;

    /// Reflect the AVR volume and mute state in the local UI
    fn set_audio_status(&mut self, mute: bool, volume: i32);
}

/// Platform power management
pub trait PowerControl: Send {
    fn power_status(&self) -> PowerStatus;
    fn wake_up(&mut self);
    fn standby(&mut self);
}

/// Supplies a record source when a recorder sends `<Record TV Screen>`
pub trait RecordRequestListener: Send {
    fn record_source(&mut self, recorder: LogicalAddress) -> Option<Vec<u8>>;
}

/// Everything the service needs from the outside world
pub struct Collaborators {
    pub transport: Box<dyn CecTransport>,
    pub settings: Box<dyn SettingsStore>,
    pub audio: Box<dyn AudioSystem>,
    pub power: Box<dyn PowerControl>,
    pub record_requests: Option<Box<dyn RecordRequestListener>>,
}

impl Collaborators {
    pub fn new(
        transport: impl CecTransport + 'static,
        settings: impl SettingsStore + 'static,
        audio: impl AudioSystem + 'static,
        power: impl PowerControl + 'static,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            settings: Box::new(settings),
            audio: Box::new(audio),
            power: Box::new(power),
            record_requests: None,
        }
    }

    /// Attach a record request listener
    pub fn record_requests(mut self, listener: impl RecordRequestListener + 'static) -> Self {
        self.record_requests = Some(Box::new(listener));
        self
    }
}
