//! Caller side of the service mailbox

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::action::Callback;
use crate::audio::{AudioStatus, SharedAudioStatus};
use crate::error::{Result, ServiceError};
use crate::event::{CecEvent, EventBus};
use crate::protocol::{ControlResult, LogicalAddress, PortId, PowerStatus};
use crate::registry::{DeviceInfo, DeviceSnapshot};
use crate::stats::{ServiceStats, StatsSnapshot};

/// Requests processed by the service thread
#[derive(Debug)]
pub(crate) enum Command {
    /// Raw frame from the bus transport
    Frame(Bytes),
    Hotplug {
        port_id: PortId,
        connected: bool,
    },
    DeviceSelect {
        address: LogicalAddress,
        reply: Callback,
    },
    PortSelect {
        port_id: PortId,
        reply: Callback,
    },
    SendKey {
        key: u8,
        pressed: bool,
    },
    SetSystemAudioMode {
        enable: bool,
        reply: Callback,
    },
    SetArcEnabled(bool),
    ChangeVolume {
        current: i32,
        delta: i32,
        max: i32,
    },
    ChangeMute(bool),
    OneTouchPlay {
        reply: Callback,
    },
    QueryDisplayStatus {
        reply: Callback<std::result::Result<PowerStatus, ControlResult>>,
    },
    StartOneTouchRecord {
        recorder: LogicalAddress,
        source: Vec<u8>,
    },
    StopOneTouchRecord {
        recorder: LogicalAddress,
    },
    StartTimerRecording {
        recorder: LogicalAddress,
        source_type: u8,
        source: Vec<u8>,
    },
    ClearTimerRecording {
        recorder: LogicalAddress,
        source_type: u8,
        source: Vec<u8>,
    },
    SetControlEnabled(bool),
    SetAutoDeviceOff(bool),
    SetAutoWakeup(bool),
    SetProhibitMode(bool),
    /// The platform is going to standby
    Standby,
    /// The platform woke up
    WakeUp,
    Shutdown,
}

/// Handle to a running CEC service
///
/// Cheap to clone and usable from any thread. Requests go through the
/// service mailbox; registry and audio state are read from published
/// snapshots without a round trip.
#[derive(Debug, Clone)]
pub struct CecHandle {
    tx: mpsc::Sender<Command>,
    snapshot: DeviceSnapshot,
    audio_status: SharedAudioStatus,
    events: EventBus,
    stats: Arc<ServiceStats>,
}

impl CecHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Command>,
        snapshot: DeviceSnapshot,
        audio_status: SharedAudioStatus,
        events: EventBus,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            tx,
            snapshot,
            audio_status,
            events,
            stats,
        }
    }

    async fn post(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServiceError::Closed.into())
    }

    /// Post a command carrying a reply callback and wait for the result.
    /// A request dropped without an answer yields `cancelled`.
    async fn request<T, F>(&self, make: F, cancelled: T) -> Result<T>
    where
        F: FnOnce(Callback<T>) -> Command,
    {
        let (callback, rx) = Callback::channel();
        self.post(make(callback)).await?;
        Ok(rx.await.unwrap_or(cancelled))
    }

    /// Hand a frame received by the transport to the service
    pub async fn receive_frame(&self, frame: Bytes) -> Result<()> {
        self.post(Command::Frame(frame)).await
    }

    /// Report a hotplug change on an input port
    pub async fn hotplug(&self, port_id: PortId, connected: bool) -> Result<()> {
        self.post(Command::Hotplug { port_id, connected }).await
    }

    /// Select a device as the TV input
    pub async fn device_select(&self, address: LogicalAddress) -> Result<ControlResult> {
        self.request(
            |reply| Command::DeviceSelect { address, reply },
            ControlResult::Exception,
        )
        .await
    }

    /// Switch the TV to an input port
    pub async fn port_select(&self, port_id: PortId) -> Result<ControlResult> {
        self.request(
            |reply| Command::PortSelect { port_id, reply },
            ControlResult::Exception,
        )
        .await
    }

    /// Forward a remote control key
    pub async fn send_key_event(&self, key: u8, pressed: bool) -> Result<()> {
        self.post(Command::SendKey { key, pressed }).await
    }

    pub async fn set_system_audio_mode(&self, enable: bool) -> Result<ControlResult> {
        self.request(
            |reply| Command::SetSystemAudioMode { enable, reply },
            ControlResult::Exception,
        )
        .await
    }

    pub async fn set_arc_enabled(&self, enabled: bool) -> Result<()> {
        self.post(Command::SetArcEnabled(enabled)).await
    }

    /// Volume key while system audio is on
    pub async fn change_volume(&self, current: i32, delta: i32, max: i32) -> Result<()> {
        self.post(Command::ChangeVolume {
            current,
            delta,
            max,
        })
        .await
    }

    pub async fn change_mute(&self, mute: bool) -> Result<()> {
        self.post(Command::ChangeMute(mute)).await
    }

    /// Playback only: wake the TV and become its active source
    pub async fn one_touch_play(&self) -> Result<ControlResult> {
        self.request(|reply| Command::OneTouchPlay { reply }, ControlResult::Exception)
            .await
    }

    /// Playback only: power status of the TV
    pub async fn query_display_status(
        &self,
    ) -> Result<std::result::Result<PowerStatus, ControlResult>> {
        self.request(
            |reply| Command::QueryDisplayStatus { reply },
            Err(ControlResult::Exception),
        )
        .await
    }

    /// Results arrive as [`CecEvent::RecordResult`]
    pub async fn start_one_touch_record(
        &self,
        recorder: LogicalAddress,
        source: Vec<u8>,
    ) -> Result<()> {
        self.post(Command::StartOneTouchRecord { recorder, source })
            .await
    }

    pub async fn stop_one_touch_record(&self, recorder: LogicalAddress) -> Result<()> {
        self.post(Command::StopOneTouchRecord { recorder }).await
    }

    /// Results arrive as [`CecEvent::TimerResult`]
    pub async fn start_timer_recording(
        &self,
        recorder: LogicalAddress,
        source_type: u8,
        source: Vec<u8>,
    ) -> Result<()> {
        self.post(Command::StartTimerRecording {
            recorder,
            source_type,
            source,
        })
        .await
    }

    pub async fn clear_timer_recording(
        &self,
        recorder: LogicalAddress,
        source_type: u8,
        source: Vec<u8>,
    ) -> Result<()> {
        self.post(Command::ClearTimerRecording {
            recorder,
            source_type,
            source,
        })
        .await
    }

    /// Master CEC switch
    pub async fn set_control_enabled(&self, enabled: bool) -> Result<()> {
        self.post(Command::SetControlEnabled(enabled)).await
    }

    pub async fn set_auto_device_off(&self, enabled: bool) -> Result<()> {
        self.post(Command::SetAutoDeviceOff(enabled)).await
    }

    pub async fn set_auto_wakeup(&self, enabled: bool) -> Result<()> {
        self.post(Command::SetAutoWakeup(enabled)).await
    }

    pub async fn set_prohibit_mode(&self, enabled: bool) -> Result<()> {
        self.post(Command::SetProhibitMode(enabled)).await
    }

    /// Tell the service the platform is going to standby
    pub async fn standby(&self) -> Result<()> {
        self.post(Command::Standby).await
    }

    /// Tell the service the platform woke up
    pub async fn wake_up(&self) -> Result<()> {
        self.post(Command::WakeUp).await
    }

    /// Stop the service thread
    pub async fn shutdown(&self) -> Result<()> {
        self.post(Command::Shutdown).await
    }

    /// Every registered device, local ones included
    pub fn device_list(&self) -> Arc<Vec<DeviceInfo>> {
        self.snapshot.all()
    }

    /// External devices the TV can switch to
    pub fn input_devices(&self) -> Arc<Vec<DeviceInfo>> {
        self.snapshot.external_sources()
    }

    pub fn device_info(&self, address: LogicalAddress) -> Option<DeviceInfo> {
        self.snapshot.get(address)
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.audio_status.get()
    }

    pub fn is_system_audio_activated(&self) -> bool {
        self.audio_status.is_system_audio_activated() && self.snapshot.has_audio_system()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CecEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the service thread is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready_eq};

    use super::*;

    fn handle(capacity: usize) -> (CecHandle, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = CecHandle::new(
            tx,
            DeviceSnapshot::default(),
            SharedAudioStatus::new(),
            EventBus::new(4),
            Arc::new(ServiceStats::new()),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn test_closed_mailbox() {
        let (handle, rx) = handle(1);
        drop(rx);

        assert!(!handle.is_running());
        let err = handle.hotplug(1, true).await.unwrap_err();
        assert_eq!(err, ServiceError::Closed.into());
    }

    #[tokio::test]
    async fn test_dropped_reply_is_exception() {
        let (handle, mut rx) = handle(1);
        let service = tokio::spawn(async move {
            // Drop the request without answering
            let command = rx.recv().await;
            assert!(matches!(command, Some(Command::DeviceSelect { .. })));
        });

        let result = handle.device_select(LogicalAddress::Playback1).await.unwrap();
        assert_eq!(result, ControlResult::Exception);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_delivered() {
        let (handle, mut rx) = handle(1);
        tokio::spawn(async move {
            if let Some(Command::SetSystemAudioMode { mut reply, .. }) = rx.recv().await {
                reply.invoke(ControlResult::TargetNotAvailable);
            }
        });

        let result = handle.set_system_audio_mode(true).await.unwrap();
        assert_eq!(result, ControlResult::TargetNotAvailable);
    }

    #[test]
    fn test_request_pending_until_reply() {
        let (handle, mut rx) = handle(1);
        let mut request = tokio_test::task::spawn(handle.port_select(2));
        assert_pending!(request.poll());

        let Ok(Command::PortSelect { port_id, mut reply }) = rx.try_recv() else {
            panic!("expected a port select command");
        };
        assert_eq!(port_id, 2);
        reply.invoke(ControlResult::Success);

        assert!(request.is_woken());
        assert_ready_eq!(request.poll(), Ok(ControlResult::Success));
    }
}
