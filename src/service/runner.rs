//! Service thread
//!
//! The controllers hold `Rc` state, so they live on one dedicated thread
//! driven by a current-thread runtime. The loop waits for either a command
//! from the mailbox or the earliest action timeout, whichever comes first.

use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tokio::runtime;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::config::CecConfig;
use super::context::ServiceContext;
use super::hal::Collaborators;
use super::handle::{CecHandle, Command};
use crate::action::{ActionHost, Callback};
use crate::audio::SharedAudioStatus;
use crate::device::{LocalDevice, PlaybackController, TvController};
use crate::error::{Result, ServiceError};
use crate::event::{CecEvent, EventBus};
use crate::protocol::address::format_path;
use crate::protocol::constants::{abort_reason, opcode};
use crate::protocol::message::build_feature_abort;
use crate::protocol::{CecMessage, ControlResult, DeviceType, LogicalAddress, MessageValidator};
use crate::registry::DeviceSnapshot;
use crate::stats::ServiceStats;

/// CEC service running the local TV and/or playback device
pub struct CecService {
    ctx: Rc<ServiceContext>,
    validator: MessageValidator,
    snapshot: DeviceSnapshot,
    audio_status: SharedAudioStatus,
    tv: Option<TvController>,
    playback: Option<PlaybackController>,
}

impl CecService {
    /// Start the service on its own thread
    ///
    /// Returns the handle used to talk to it and the thread's join handle.
    /// The thread exits after [`CecHandle::shutdown`] or once every handle
    /// has been dropped.
    pub fn spawn(
        config: CecConfig,
        collaborators: Collaborators,
    ) -> Result<(CecHandle, JoinHandle<()>)> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ServiceError::Spawn(e.to_string()))?;

        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let events = EventBus::new(config.event_capacity);
        let stats = Arc::new(ServiceStats::new());
        let snapshot = DeviceSnapshot::default();
        let audio_status = SharedAudioStatus::new();

        let handle = CecHandle::new(
            tx,
            snapshot.clone(),
            audio_status.clone(),
            events.clone(),
            Arc::clone(&stats),
        );

        let thread = thread::Builder::new()
            .name("cec-service".to_string())
            .spawn(move || {
                let ctx = Rc::new(ServiceContext::new(config, collaborators, events, stats));
                let service = CecService::new(ctx, snapshot, audio_status);
                runtime.block_on(service.run(mailbox));
            })
            .map_err(|e| ServiceError::Spawn(e.to_string()))?;

        Ok((handle, thread))
    }

    fn new(ctx: Rc<ServiceContext>, snapshot: DeviceSnapshot, audio_status: SharedAudioStatus) -> Self {
        Self {
            ctx,
            validator: MessageValidator::new(),
            snapshot,
            audio_status,
            tv: None,
            playback: None,
        }
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Command>) {
        info!(
            path = %format_path(self.ctx.physical_address()),
            "CEC service started"
        );
        if self.ctx.is_control_enabled() {
            self.initialize(true);
        }

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = sleep_until(deadline) => self.fire_timers(),
            }
        }

        self.disable_devices(false);
        info!("CEC service stopped");
    }

    /// Claim logical addresses and (re)create the local devices
    fn initialize(&mut self, from_bootup: bool) {
        let previous = self.ctx.clear_logical_addresses();
        let device_types = self.ctx.config().device_types.clone();
        let mut allocated = Vec::new();
        for device_type in device_types {
            let address = self.allocate_logical_address(device_type, &previous);
            if address == LogicalAddress::Unregistered {
                warn!(?device_type, "No free logical address, device skipped");
                continue;
            }
            self.ctx.add_logical_address(address);
            allocated.push((device_type, address));
        }

        self.tv = None;
        self.playback = None;
        for (device_type, address) in allocated {
            match device_type {
                DeviceType::Tv => {
                    self.tv = Some(TvController::new(
                        Rc::clone(&self.ctx),
                        address,
                        self.snapshot.clone(),
                        self.audio_status.clone(),
                    ));
                }
                DeviceType::Playback => {
                    self.playback = Some(PlaybackController::new(Rc::clone(&self.ctx), address));
                }
                other => warn!(device_type = ?other, "Unsupported local device type"),
            }
        }

        if let Some(tv) = self.tv.as_mut() {
            tv.on_address_allocated(from_bootup);
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.on_address_allocated(from_bootup);
        }
    }

    /// First candidate that was ours before or that nobody acknowledges
    fn allocate_logical_address(
        &self,
        device_type: DeviceType,
        previous: &[LogicalAddress],
    ) -> LogicalAddress {
        LogicalAddress::candidates_for(device_type)
            .iter()
            .copied()
            .find(|&candidate| {
                previous.contains(&candidate)
                    || !self.ctx.poll(candidate, candidate).is_success()
            })
            .unwrap_or(LogicalAddress::Unregistered)
    }

    fn disable_devices(&mut self, initiated_by_cec: bool) {
        if let Some(tv) = self.tv.as_mut() {
            tv.disable_device(initiated_by_cec);
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.disable_device(initiated_by_cec);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let tv = self
            .tv
            .as_ref()
            .and_then(|tv| tv.scheduler_ref().next_deadline());
        let playback = self
            .playback
            .as_ref()
            .and_then(|playback| playback.scheduler_ref().next_deadline());
        match (tv, playback) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        if let Some(tv) = self.tv.as_mut() {
            tv.fire_timers(now);
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.fire_timers(now);
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Frame(frame) => self.on_frame(frame),
            Command::Hotplug { port_id, connected } => {
                self.ctx.announce(CecEvent::Hotplug { port_id, connected });
                if let Some(tv) = self.tv.as_mut() {
                    tv.on_hotplug(port_id, connected);
                }
                if let Some(playback) = self.playback.as_mut() {
                    playback.on_hotplug(port_id, connected);
                }
            }
            Command::DeviceSelect { address, reply } => {
                if let Some((tv, reply)) = self.tv_or_abort(reply, "device select") {
                    tv.device_select(address, reply);
                }
            }
            Command::PortSelect { port_id, reply } => {
                if let Some((tv, reply)) = self.tv_or_abort(reply, "port select") {
                    tv.do_manual_port_switching(port_id, reply);
                }
            }
            Command::SetSystemAudioMode { enable, reply } => {
                if let Some((tv, reply)) = self.tv_or_abort(reply, "system audio mode") {
                    tv.change_system_audio_mode(enable, reply);
                }
            }
            Command::SendKey { key, pressed } => {
                if let Some(tv) = self.tv.as_mut() {
                    tv.send_key_event(key, pressed);
                } else if let Some(playback) = self.playback.as_mut() {
                    playback.send_key_event(key, pressed);
                }
            }
            Command::OneTouchPlay { mut reply } => match self.playback.as_mut() {
                Some(playback) => playback.one_touch_play(reply),
                None => {
                    warn!("One touch play needs a playback device");
                    reply.invoke(ControlResult::IncorrectMode);
                }
            },
            Command::QueryDisplayStatus { mut reply } => match self.playback.as_mut() {
                Some(playback) => playback.query_display_status(reply),
                None => {
                    warn!("Display status query needs a playback device");
                    reply.invoke(Err(ControlResult::IncorrectMode));
                }
            },
            Command::SetControlEnabled(enabled) => self.set_control_enabled(enabled),
            Command::SetProhibitMode(enabled) => {
                info!(enabled, "Prohibit mode");
                self.ctx.set_prohibit_mode(enabled);
            }
            Command::Standby => self.on_standby(),
            Command::WakeUp => self.on_wake_up(),
            Command::Shutdown => {}
            command => self.handle_tv_command(command),
        }
    }

    /// Commands only a TV device can serve; dropped with a warning otherwise
    fn handle_tv_command(&mut self, command: Command) {
        let Some(tv) = self.tv.as_mut() else {
            warn!(?command, "Ignoring request: no local TV device");
            return;
        };
        match command {
            Command::SetArcEnabled(enabled) => tv.change_arc_feature_enabled(enabled),
            Command::ChangeVolume {
                current,
                delta,
                max,
            } => tv.change_volume(current, delta, max),
            Command::ChangeMute(mute) => tv.change_mute(mute),
            Command::StartOneTouchRecord { recorder, source } => {
                tv.start_one_touch_record(recorder, Some(source))
            }
            Command::StopOneTouchRecord { recorder } => tv.stop_one_touch_record(recorder),
            Command::StartTimerRecording {
                recorder,
                source_type,
                source,
            } => tv.start_timer_recording(recorder, source_type, Some(source)),
            Command::ClearTimerRecording {
                recorder,
                source_type,
                source,
            } => tv.clear_timer_recording(recorder, source_type, Some(source)),
            Command::SetAutoDeviceOff(enabled) => tv.set_auto_device_off(enabled),
            Command::SetAutoWakeup(enabled) => tv.set_auto_wakeup(enabled),
            other => debug!(command = ?other, "Not a TV command"),
        }
    }

    /// The TV controller paired with the callback, or `IncorrectMode` when
    /// no TV is hosted
    fn tv_or_abort(
        &mut self,
        mut reply: Callback,
        request: &str,
    ) -> Option<(&mut TvController, Callback)> {
        match self.tv.as_mut() {
            Some(tv) => Some((tv, reply)),
            None => {
                warn!(request, "Request needs a local TV device");
                reply.invoke(ControlResult::IncorrectMode);
                None
            }
        }
    }

    fn on_frame(&mut self, frame: Bytes) {
        let stats = Arc::clone(self.ctx.stats());
        stats.frame_received();

        let message = match CecMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                stats.frame_dropped();
                return;
            }
        };
        if let Err(e) = self.validator.validate(&message) {
            warn!(%message, error = %e, "Dropping invalid message");
            stats.frame_dropped();
            return;
        }
        if !self.ctx.is_control_enabled() {
            debug!(%message, "CEC control disabled, ignoring message");
            return;
        }

        debug!(%message, "Received");
        self.dispatch(&message);
    }

    fn dispatch(&mut self, message: &CecMessage) {
        let broadcast = message.is_broadcast();
        let mut handled = false;
        if let Some(tv) = self.tv.as_mut() {
            if broadcast || tv.address() == message.destination {
                handled |= tv.dispatch_message(message);
            }
        }
        if let Some(playback) = self.playback.as_mut() {
            if broadcast || playback.address() == message.destination {
                handled |= playback.dispatch_message(message);
            }
        }

        if handled
            || broadcast
            || message.opcode == opcode::FEATURE_ABORT
            || !self.ctx.is_local_address(message.destination)
        {
            return;
        }
        warn!(%message, "Unhandled message");
        self.ctx.stats().message_unhandled();
        self.ctx.send_cec_command(&build_feature_abort(
            message.destination,
            message.source,
            message.opcode,
            abort_reason::UNRECOGNIZED_OPCODE,
        ));
    }

    fn set_control_enabled(&mut self, enabled: bool) {
        if enabled == self.ctx.is_control_enabled() {
            return;
        }
        info!(enabled, "CEC control switched");
        if enabled {
            self.ctx.set_control_enabled(true);
            self.initialize(false);
        } else {
            self.disable_devices(false);
            self.ctx.set_control_enabled(false);
        }
    }

    fn on_standby(&mut self) {
        let by_cec = self.ctx.take_standby_message_received();
        info!(initiated_by_cec = by_cec, "Going to standby");
        if let Some(tv) = self.tv.as_mut() {
            tv.disable_device(by_cec);
            tv.on_standby(by_cec);
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.disable_device(by_cec);
        }
    }

    fn on_wake_up(&mut self) {
        info!("Waking up");
        if self.ctx.is_control_enabled() {
            self.initialize(false);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::PowerStatus;
    use crate::testing::{FakeAudio, FakeBus, FakePower, FakeSettings};

    struct Running {
        handle: CecHandle,
        thread: JoinHandle<()>,
        bus: FakeBus,
        power: FakePower,
    }

    fn start(config: CecConfig, bus: FakeBus) -> Running {
        let power = FakePower::default();
        let collaborators = Collaborators::new(
            bus.clone(),
            FakeSettings::default(),
            FakeAudio::default(),
            power.clone(),
        );
        let (handle, thread) = CecService::spawn(config, collaborators).unwrap();
        Running {
            handle,
            thread,
            bus,
            power,
        }
    }

    impl Running {
        /// Round trip through the mailbox so every earlier command is processed
        async fn settle(&self) {
            let _ = self.handle.device_select(LogicalAddress::Tv).await.unwrap();
        }

        async fn stop(self) {
            self.handle.shutdown().await.unwrap();
            let thread = self.thread;
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .unwrap()
                .unwrap();
        }
    }

    fn frame(source: LogicalAddress, destination: LogicalAddress, bytes: &[u8]) -> Bytes {
        let mut frame = vec![(source.as_u8() << 4) | destination.as_u8()];
        frame.extend_from_slice(bytes);
        Bytes::from(frame)
    }

    #[tokio::test]
    async fn test_tv_allocates_and_registers_itself() {
        let service = start(CecConfig::default(), FakeBus::default());
        service.settle().await;

        assert_eq!(service.bus.claimed(), vec![LogicalAddress::Tv]);
        assert_eq!(
            service.bus.sent_with(opcode::REPORT_PHYSICAL_ADDRESS).len(),
            1
        );
        // Discovery found nobody and registered the local TV
        let devices = service.handle.device_list();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].logical_address, LogicalAddress::Tv);
        assert!(service.handle.input_devices().is_empty());

        service.stop().await;
    }

    #[tokio::test]
    async fn test_playback_skips_taken_address() {
        let bus = FakeBus::with_devices(&[LogicalAddress::Tv, LogicalAddress::Playback1]);
        let service = start(CecConfig::playback(0x1000), bus);
        service.settle().await;

        assert_eq!(service.bus.claimed(), vec![LogicalAddress::Playback2]);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_device_without_free_address_is_skipped() {
        let bus = FakeBus::with_devices(&[
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            LogicalAddress::Playback2,
            LogicalAddress::Playback3,
        ]);
        let service = start(CecConfig::playback(0x1000), bus);

        let result = service.handle.one_touch_play().await.unwrap();
        assert_eq!(result, ControlResult::IncorrectMode);
        assert!(service.bus.claimed().is_empty());
        assert!(service.bus.sent().is_empty());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_unhandled_message_is_feature_aborted() {
        let service = start(CecConfig::default(), FakeBus::default());
        service
            .handle
            .receive_frame(frame(
                LogicalAddress::Playback1,
                LogicalAddress::Tv,
                &[opcode::VENDOR_COMMAND, 0x01],
            ))
            .await
            .unwrap();
        service.settle().await;

        let aborts = service.bus.sent_with(opcode::FEATURE_ABORT);
        assert_eq!(aborts.len(), 1);
        assert_eq!(aborts[0].source, LogicalAddress::Tv);
        assert_eq!(aborts[0].destination, LogicalAddress::Playback1);
        assert_eq!(
            &aborts[0].params[..],
            &[opcode::VENDOR_COMMAND, abort_reason::UNRECOGNIZED_OPCODE]
        );

        let stats = service.handle.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.messages_unhandled, 1);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let service = start(CecConfig::default(), FakeBus::default());
        // Header only: a polling message
        service
            .handle
            .receive_frame(Bytes::from_static(&[0x40]))
            .await
            .unwrap();
        service.settle().await;

        let stats = service.handle.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_dropped, 1);
        assert!(service.bus.sent_with(opcode::FEATURE_ABORT).is_empty());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_control_disabled_ignores_frames() {
        let service = start(CecConfig::default(), FakeBus::default());
        service.handle.set_control_enabled(false).await.unwrap();
        service
            .handle
            .receive_frame(frame(
                LogicalAddress::Playback1,
                LogicalAddress::Tv,
                &[opcode::VENDOR_COMMAND, 0x01],
            ))
            .await
            .unwrap();
        service.settle().await;

        assert!(service.bus.sent_with(opcode::FEATURE_ABORT).is_empty());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_tv_request_without_tv() {
        let service = start(CecConfig::playback(0x1000), FakeBus::default());

        let result = service
            .handle
            .device_select(LogicalAddress::Playback2)
            .await
            .unwrap();
        assert_eq!(result, ControlResult::IncorrectMode);
        let result = service.handle.set_system_audio_mode(true).await.unwrap();
        assert_eq!(result, ControlResult::IncorrectMode);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_display_status_without_tv() {
        let service = start(CecConfig::playback(0x1000), FakeBus::default());

        let result = service.handle.query_display_status().await.unwrap();
        assert_eq!(result, Err(ControlResult::Communication));
        service.stop().await;
    }

    #[tokio::test]
    async fn test_one_touch_play() {
        let bus = FakeBus::with_devices(&[LogicalAddress::Tv]);
        let service = start(CecConfig::playback(0x1000), bus);

        let handle = service.handle.clone();
        let play = tokio::spawn(async move { handle.one_touch_play().await });

        // Wait for the power status query before answering it
        let bus = service.bus.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while bus.sent_with(opcode::GIVE_DEVICE_POWER_STATUS).is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        service
            .handle
            .receive_frame(frame(
                LogicalAddress::Tv,
                LogicalAddress::Playback1,
                &[opcode::REPORT_POWER_STATUS, PowerStatus::On.as_u8()],
            ))
            .await
            .unwrap();

        assert_eq!(play.await.unwrap().unwrap(), ControlResult::Success);
        assert_eq!(service.bus.sent_with(opcode::TEXT_VIEW_ON).len(), 1);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_hotplug_event() {
        let service = start(CecConfig::default(), FakeBus::default());
        let mut events = service.handle.subscribe();

        service.handle.hotplug(2, true).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(event @ CecEvent::Hotplug { .. }) => return event,
                    Ok(_) => continue,
                    Err(e) => panic!("event channel failed: {e}"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(
            event,
            CecEvent::Hotplug {
                port_id: 2,
                connected: true
            }
        );
        service.stop().await;
    }

    #[tokio::test]
    async fn test_standby_and_wake_up() {
        let service = start(CecConfig::default(), FakeBus::default());
        service.handle.standby().await.unwrap();
        service.settle().await;

        let standby = service.bus.sent_with(opcode::STANDBY);
        assert_eq!(standby.len(), 1);
        assert!(standby[0].is_broadcast());

        service.handle.wake_up().await.unwrap();
        service.settle().await;
        assert_eq!(
            service.bus.claimed(),
            vec![LogicalAddress::Tv, LogicalAddress::Tv]
        );
        assert_eq!(service.bus.clears(), 2);
        assert_eq!(service.power.standbys(), 0);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailbox() {
        let service = start(CecConfig::default(), FakeBus::default());
        let handle = service.handle.clone();
        service.stop().await;

        assert!(!handle.is_running());
        let err = handle.set_auto_wakeup(false).await.unwrap_err();
        assert_eq!(err, ServiceError::Closed.into());
    }
}
