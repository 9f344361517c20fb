//! Fakes shared by unit tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::audio::SharedAudioStatus;
use crate::device::{PlaybackController, TvController};
use crate::event::{CecEvent, EventBus};
use crate::protocol::{CecMessage, LogicalAddress, PowerStatus};
use crate::registry::DeviceSnapshot;
use crate::service::config::CecConfig;
use crate::service::context::ServiceContext;
use crate::service::hal::{
    AudioSystem, CecTransport, Collaborators, PowerControl, RecordRequestListener, SendResult,
    SettingsStore,
};
use crate::stats::ServiceStats;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct BusState {
    pub sent: Vec<CecMessage>,
    /// Addresses that acknowledge polls and directed frames
    pub present: HashSet<LogicalAddress>,
    pub claimed: Vec<LogicalAddress>,
    pub clears: usize,
    pub arc: Option<bool>,
}

/// Transport that records every frame
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBus(Arc<Mutex<BusState>>);

impl FakeBus {
    pub fn with_devices(devices: &[LogicalAddress]) -> Self {
        let bus = Self::default();
        for &device in devices {
            bus.connect(device);
        }
        bus
    }

    pub fn connect(&self, address: LogicalAddress) {
        lock(&self.0).present.insert(address);
    }

    pub fn disconnect(&self, address: LogicalAddress) {
        lock(&self.0).present.remove(&address);
    }

    pub fn sent(&self) -> Vec<CecMessage> {
        lock(&self.0).sent.clone()
    }

    /// Drain the recorded frames
    pub fn take_sent(&self) -> Vec<CecMessage> {
        std::mem::take(&mut lock(&self.0).sent)
    }

    pub fn sent_opcodes(&self) -> Vec<u8> {
        lock(&self.0).sent.iter().map(|message| message.opcode).collect()
    }

    pub fn sent_with(&self, opcode: u8) -> Vec<CecMessage> {
        lock(&self.0)
            .sent
            .iter()
            .filter(|message| message.opcode == opcode)
            .cloned()
            .collect()
    }

    pub fn claimed(&self) -> Vec<LogicalAddress> {
        lock(&self.0).claimed.clone()
    }

    /// How many times the claimed addresses were dropped
    pub fn clears(&self) -> usize {
        lock(&self.0).clears
    }

    pub fn arc(&self) -> Option<bool> {
        lock(&self.0).arc
    }
}

impl CecTransport for FakeBus {
    fn send_command(&mut self, message: &CecMessage) -> SendResult {
        let mut state = lock(&self.0);
        state.sent.push(message.clone());
        if message.is_broadcast() || state.present.contains(&message.destination) {
            SendResult::Success
        } else {
            SendResult::Nack
        }
    }

    fn poll(&mut self, _source: LogicalAddress, destination: LogicalAddress) -> SendResult {
        if lock(&self.0).present.contains(&destination) {
            SendResult::Success
        } else {
            SendResult::Nack
        }
    }

    fn add_logical_address(&mut self, address: LogicalAddress) {
        lock(&self.0).claimed.push(address);
    }

    fn clear_logical_address(&mut self) {
        lock(&self.0).clears += 1;
    }

    fn set_audio_return_channel(&mut self, enabled: bool) {
        lock(&self.0).arc = Some(enabled);
    }
}

/// In-memory settings store
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSettings(Arc<Mutex<HashMap<String, bool>>>);

impl FakeSettings {
    pub fn get(&self, key: &str) -> Option<bool> {
        lock(&self.0).get(key).copied()
    }

    pub fn set(&self, key: &str, value: bool) {
        lock(&self.0).insert(key.to_string(), value);
    }
}

impl SettingsStore for FakeSettings {
    fn read_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).unwrap_or(default)
    }

    fn write_bool(&mut self, key: &str, value: bool) {
        self.set(key, value);
    }
}

#[derive(Debug, Default)]
pub(crate) struct AudioState {
    pub system_audio_supported: Option<bool>,
    pub arc_connected: Option<bool>,
    pub status: Option<(bool, i32)>,
}

/// Audio subsystem recording what it was told
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeAudio(Arc<Mutex<AudioState>>);

impl FakeAudio {
    pub fn system_audio_supported(&self) -> Option<bool> {
        lock(&self.0).system_audio_supported
    }

    pub fn arc_connected(&self) -> Option<bool> {
        lock(&self.0).arc_connected
    }

    pub fn status(&self) -> Option<(bool, i32)> {
        lock(&self.0).status
    }
}

impl AudioSystem for FakeAudio {
    fn set_system_audio_supported(&mut self, on: bool) {
        lock(&self.0).system_audio_supported = Some(on);
    }

    fn set_arc_connected(&mut self, connected: bool, _name: &str) {
        lock(&self.0).arc_connected = Some(connected);
    }

    fn max_volume(&self) -> i32 {
        100
    }

    fn set_audio_status(&mut self, mute: bool, volume: i32) {
        lock(&self.0).status = Some((mute, volume));
    }
}

#[derive(Debug)]
pub(crate) struct PowerState {
    pub status: PowerStatus,
    pub wake_ups: usize,
    pub standbys: usize,
}

/// Power control that flips between on and standby
#[derive(Debug, Clone)]
pub(crate) struct FakePower(Arc<Mutex<PowerState>>);

impl Default for FakePower {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(PowerState {
            status: PowerStatus::On,
            wake_ups: 0,
            standbys: 0,
        })))
    }
}

impl FakePower {
    pub fn set_status(&self, status: PowerStatus) {
        lock(&self.0).status = status;
    }

    pub fn wake_ups(&self) -> usize {
        lock(&self.0).wake_ups
    }

    pub fn standbys(&self) -> usize {
        lock(&self.0).standbys
    }
}

impl PowerControl for FakePower {
    fn power_status(&self) -> PowerStatus {
        lock(&self.0).status
    }

    fn wake_up(&mut self) {
        let mut state = lock(&self.0);
        state.status = PowerStatus::On;
        state.wake_ups += 1;
    }

    fn standby(&mut self) {
        let mut state = lock(&self.0);
        state.status = PowerStatus::Standby;
        state.standbys += 1;
    }
}

/// Record request listener answering with a fixed source
#[derive(Debug, Clone)]
pub(crate) struct FixedRecordSource(pub Option<Vec<u8>>);

impl RecordRequestListener for FixedRecordSource {
    fn record_source(&mut self, _recorder: LogicalAddress) -> Option<Vec<u8>> {
        self.0.clone()
    }
}

/// One service context wired to fakes
pub(crate) struct Harness {
    pub bus: FakeBus,
    pub settings: FakeSettings,
    pub audio: FakeAudio,
    pub power: FakePower,
    pub ctx: Rc<ServiceContext>,
    pub events: broadcast::Receiver<CecEvent>,
}

impl Harness {
    pub fn new(config: CecConfig) -> Self {
        Self::with_record_source(config, None)
    }

    pub fn with_record_source(config: CecConfig, source: Option<Vec<u8>>) -> Self {
        let bus = FakeBus::default();
        let settings = FakeSettings::default();
        let audio = FakeAudio::default();
        let power = FakePower::default();
        let collaborators = Collaborators::new(
            bus.clone(),
            settings.clone(),
            audio.clone(),
            power.clone(),
        )
        .record_requests(FixedRecordSource(source));
        let bus_events = EventBus::new(64);
        let events = bus_events.subscribe();
        let ctx = Rc::new(ServiceContext::new(
            config,
            collaborators,
            bus_events,
            Arc::new(ServiceStats::new()),
        ));
        Self {
            bus,
            settings,
            audio,
            power,
            ctx,
            events,
        }
    }

    /// TV controller at logical address 0 with an empty registry
    pub fn tv(&self) -> TvController {
        self.ctx.add_logical_address(LogicalAddress::Tv);
        TvController::new(
            Rc::clone(&self.ctx),
            LogicalAddress::Tv,
            DeviceSnapshot::default(),
            SharedAudioStatus::new(),
        )
    }

    pub fn playback(&self, address: LogicalAddress) -> PlaybackController {
        self.ctx.add_logical_address(address);
        PlaybackController::new(Rc::clone(&self.ctx), address)
    }

    /// Every event announced so far
    pub fn drain_events(&mut self) -> Vec<CecEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
