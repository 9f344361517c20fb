//! Playback local device

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::key::SendKey;
use crate::action::playback::{DevicePowerStatus, OneTouchPlay};
use crate::action::{
    ActionHost, ActionScheduler, Callback, PlaybackAction, PlaybackActionKind, Step,
};
use crate::device::LocalDevice;
use crate::protocol::constants::opcode;
use crate::protocol::message::{build_inactive_source, build_report_physical_address};
use crate::protocol::{CecMessage, ControlResult, DeviceType, LogicalAddress, PortId, PowerStatus};
use crate::registry::MessageCache;
use crate::service::context::ServiceContext;

/// Playback-side CEC controller. Lives on the service thread only.
pub struct PlaybackController {
    ctx: Rc<ServiceContext>,
    address: LogicalAddress,
    cache: MessageCache,
    actions: ActionScheduler<PlaybackAction>,
    is_active_source: bool,
}

impl PlaybackController {
    pub fn new(ctx: Rc<ServiceContext>, address: LogicalAddress) -> Self {
        let actions = ActionScheduler::with_stats(Arc::clone(ctx.stats()));
        Self {
            ctx,
            address,
            cache: MessageCache::new(),
            actions,
            is_active_source: false,
        }
    }

    pub fn is_active_source(&self) -> bool {
        self.is_active_source
    }

    pub(crate) fn mark_active_source(&mut self) {
        self.is_active_source = true;
    }

    pub fn on_address_allocated(&mut self, from_bootup: bool) {
        info!(address = %self.address, from_bootup, "Playback address allocated");
        self.send(&build_report_physical_address(
            self.address,
            self.physical_address(),
            DeviceType::Playback,
        ));
    }

    /// Wake the TV and route it to us
    pub fn one_touch_play(&mut self, mut callback: Callback) {
        if self.has_action(PlaybackActionKind::OneTouchPlay) {
            warn!("One touch play already in progress");
            callback.invoke(ControlResult::AlreadyInProgress);
            return;
        }
        let action = OneTouchPlay::new(LogicalAddress::Tv, callback);
        self.add_and_start_action(PlaybackAction::OneTouchPlay(action));
    }

    /// Ask the TV for its power status
    pub fn query_display_status(
        &mut self,
        mut callback: Callback<Result<PowerStatus, ControlResult>>,
    ) {
        if self.has_action(PlaybackActionKind::DevicePowerStatus) {
            warn!("Display status query already in progress");
            callback.invoke(Err(ControlResult::AlreadyInProgress));
            return;
        }
        let action = DevicePowerStatus::new(LogicalAddress::Tv, callback);
        self.add_and_start_action(PlaybackAction::DevicePowerStatus(action));
    }

    pub fn on_hotplug(&mut self, port_id: PortId, connected: bool) {
        debug!(port_id, connected, "Hotplug");
        self.cache.flush_all();
        self.is_active_source = false;
        if connected && self.ctx.is_power_standby_or_transient() {
            self.ctx.wake_up();
        }
    }

    /// Forward a remote key to the TV
    pub fn send_key_event(&mut self, key: u8, pressed: bool) {
        let forwarded = self.drive_action(PlaybackActionKind::SendKey, |action, device| match action {
            PlaybackAction::SendKey(send_key) => send_key.process_key_event(device, key, pressed),
            _ => Step::Continue,
        });
        if forwarded {
            return;
        }
        if pressed {
            let action = SendKey::new(LogicalAddress::Tv, key);
            self.add_and_start_action(PlaybackAction::SendKey(action));
        } else {
            warn!(key, "Release without a pending press");
        }
    }

    pub fn disable_device(&mut self, initiated_by_cec: bool) {
        debug!(initiated_by_cec, "Disabling playback device");
        self.actions.clear();
        if !initiated_by_cec && self.is_active_source {
            self.send(&build_inactive_source(self.address, self.physical_address()));
        }
        self.is_active_source = false;
    }

    fn handle_active_source(&mut self, message: &CecMessage) -> bool {
        let Some(path) = message.physical_address() else {
            return false;
        };
        if path == self.physical_address() {
            return false;
        }
        self.is_active_source = false;
        if self.ctx.is_power_on_or_transient() {
            info!(from = %message.source, "Lost active source, going to standby");
            self.ctx.standby();
        }
        true
    }

    fn handle_set_stream_path(&mut self, message: &CecMessage) -> bool {
        let Some(path) = message.physical_address() else {
            return false;
        };
        if path != self.physical_address() {
            return false;
        }
        if self.ctx.is_power_standby_or_transient() {
            self.ctx.wake_up();
        }
        true
    }
}

impl ActionHost for PlaybackController {
    type Action = PlaybackAction;

    fn scheduler(&mut self) -> &mut ActionScheduler<PlaybackAction> {
        &mut self.actions
    }

    fn scheduler_ref(&self) -> &ActionScheduler<PlaybackAction> {
        &self.actions
    }
}

impl LocalDevice for PlaybackController {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn address(&self) -> LogicalAddress {
        self.address
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Playback
    }

    fn message_cache(&mut self) -> &mut MessageCache {
        &mut self.cache
    }

    fn handle_message(&mut self, message: &CecMessage) -> bool {
        match message.opcode {
            opcode::ACTIVE_SOURCE => self.handle_active_source(message),
            opcode::SET_STREAM_PATH => self.handle_set_stream_path(message),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::protocol::message::{build_active_source, build_set_stream_path};
    use crate::service::config::CecConfig;
    use crate::testing::Harness;

    const PATH: u16 = 0x1000;

    fn harness() -> (Harness, PlaybackController) {
        let h = Harness::new(CecConfig::playback(PATH));
        let playback = h.playback(LogicalAddress::Playback1);
        (h, playback)
    }

    fn power_report(status: PowerStatus) -> CecMessage {
        CecMessage::new(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            opcode::REPORT_POWER_STATUS,
            vec![status.as_u8()],
        )
    }

    fn later(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_one_touch_play() {
        let (h, mut playback) = harness();
        h.bus.connect(LogicalAddress::Tv);
        let (callback, mut rx) = Callback::channel();

        playback.one_touch_play(callback);
        assert_eq!(
            h.bus.sent_opcodes(),
            vec![
                opcode::TEXT_VIEW_ON,
                opcode::ACTIVE_SOURCE,
                opcode::GIVE_DEVICE_POWER_STATUS
            ]
        );
        assert!(playback.is_active_source());

        // Still warming up
        assert!(playback.dispatch_message(&power_report(PowerStatus::TransientToOn)));
        assert!(rx.try_recv().is_err());

        assert!(playback.dispatch_message(&power_report(PowerStatus::On)));
        assert_eq!(rx.try_recv().unwrap(), ControlResult::Success);
        assert!(!playback.has_action(PlaybackActionKind::OneTouchPlay));
    }

    #[test]
    fn test_one_touch_play_already_in_progress() {
        let (h, mut playback) = harness();
        h.bus.connect(LogicalAddress::Tv);
        let (first, _first_rx) = Callback::channel();
        let (second, mut second_rx) = Callback::channel();

        playback.one_touch_play(first);
        playback.one_touch_play(second);

        assert_eq!(second_rx.try_recv().unwrap(), ControlResult::AlreadyInProgress);
        assert_eq!(h.bus.sent_with(opcode::TEXT_VIEW_ON).len(), 1);
    }

    #[test]
    fn test_one_touch_play_gives_up() {
        let (h, mut playback) = harness();
        h.bus.connect(LogicalAddress::Tv);
        let (callback, mut rx) = Callback::channel();
        playback.one_touch_play(callback);

        for _ in 0..9 {
            playback.fire_timers(later(2_100));
            assert!(rx.try_recv().is_err());
        }
        playback.fire_timers(later(2_100));

        assert_eq!(rx.try_recv().unwrap(), ControlResult::Timeout);
        assert_eq!(h.bus.sent_with(opcode::GIVE_DEVICE_POWER_STATUS).len(), 10);
    }

    #[test]
    fn test_query_display_status() {
        let (h, mut playback) = harness();
        h.bus.connect(LogicalAddress::Tv);
        let (callback, mut rx) = Callback::channel();

        playback.query_display_status(callback);
        assert!(playback.dispatch_message(&power_report(PowerStatus::Standby)));

        assert_eq!(rx.try_recv().unwrap(), Ok(PowerStatus::Standby));
    }

    #[test]
    fn test_query_display_status_failures() {
        let (h, mut playback) = harness();

        // Nobody acknowledges the query
        let (callback, mut rx) = Callback::channel();
        playback.query_display_status(callback);
        assert_eq!(rx.try_recv().unwrap(), Err(ControlResult::Communication));

        // Acknowledged but never answered
        h.bus.connect(LogicalAddress::Tv);
        let (callback, mut rx) = Callback::channel();
        playback.query_display_status(callback);
        let (busy, mut busy_rx) = Callback::channel();
        playback.query_display_status(busy);
        assert_eq!(busy_rx.try_recv().unwrap(), Err(ControlResult::AlreadyInProgress));

        playback.fire_timers(later(2_100));
        assert_eq!(rx.try_recv().unwrap(), Ok(PowerStatus::Unknown));
    }

    #[test]
    fn test_active_source_elsewhere_goes_to_standby() {
        let (h, mut playback) = harness();
        playback.mark_active_source();

        // Our own announcement echoed back is not for us to handle
        assert!(!playback.dispatch_message(&build_active_source(LogicalAddress::Playback1, PATH)));
        assert!(playback.is_active_source());

        assert!(playback.dispatch_message(&build_active_source(LogicalAddress::Playback2, 0x2000)));
        assert!(!playback.is_active_source());
        assert_eq!(h.power.standbys(), 1);
    }

    #[test]
    fn test_set_stream_path_wakes_up() {
        let (h, mut playback) = harness();
        h.power.set_status(PowerStatus::Standby);

        assert!(!playback.dispatch_message(&build_set_stream_path(LogicalAddress::Tv, 0x2000)));
        assert_eq!(h.power.wake_ups(), 0);

        assert!(playback.dispatch_message(&build_set_stream_path(LogicalAddress::Tv, PATH)));
        assert_eq!(h.power.wake_ups(), 1);
    }

    #[test]
    fn test_hotplug() {
        let (h, mut playback) = harness();
        playback.mark_active_source();
        h.power.set_status(PowerStatus::Standby);

        playback.on_hotplug(1, false);
        assert!(!playback.is_active_source());
        assert_eq!(h.power.wake_ups(), 0);

        playback.on_hotplug(1, true);
        assert_eq!(h.power.wake_ups(), 1);
    }

    #[test]
    fn test_disable_device() {
        let (h, mut playback) = harness();
        playback.mark_active_source();
        playback.disable_device(true);
        assert!(h.bus.sent_with(opcode::INACTIVE_SOURCE).is_empty());

        playback.mark_active_source();
        playback.disable_device(false);
        let inactive = h.bus.sent_with(opcode::INACTIVE_SOURCE);
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].physical_address(), Some(PATH));
        assert!(!playback.is_active_source());
    }

    #[test]
    fn test_send_key() {
        let (h, mut playback) = harness();
        h.bus.connect(LogicalAddress::Tv);

        playback.send_key_event(0x41, false);
        assert!(h.bus.sent().is_empty());

        playback.send_key_event(0x41, true);
        playback.send_key_event(0x41, false);

        let sent = h.bus.take_sent();
        assert_eq!(
            sent.iter().map(|m| m.opcode).collect::<Vec<_>>(),
            vec![opcode::USER_CONTROL_PRESSED, opcode::USER_CONTROL_RELEASED]
        );
        assert!(sent.iter().all(|m| m.destination == LogicalAddress::Tv));
        assert!(!playback.has_action(PlaybackActionKind::SendKey));
    }
}
