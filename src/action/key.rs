//! Remote key forwarding

use super::scheduler::millis;
use super::{FeatureAction, Step};
use crate::device::LocalDevice;
use crate::protocol::message::{build_user_control_pressed, build_user_control_released};
use crate::protocol::{CecMessage, LogicalAddress};

const STATE_PRESSED: u32 = 1;

/// Repeat interval of a held key
const IRT_MS: u64 = 300;

/// A held key is released on our own after this long without news
const AWAIT_RELEASE_KEY_MS: u64 = 1_000;

/// Forward a key press to a device and repeat it while held
#[derive(Debug)]
pub struct SendKey {
    target: LogicalAddress,
    key: u8,
    held_ms: u64,
}

impl SendKey {
    pub fn new(target: LogicalAddress, key: u8) -> Self {
        Self {
            target,
            key,
            held_ms: 0,
        }
    }

    /// Feed the next press or release of the key being forwarded
    pub fn process_key_event<H: LocalDevice>(
        &mut self,
        host: &mut H,
        key: u8,
        pressed: bool,
    ) -> Step {
        if !pressed {
            host.send(&build_user_control_released(host.address(), self.target));
            return Step::Finished;
        }
        self.key = key;
        self.held_ms = 0;
        self.send_pressed(host)
    }

    fn send_pressed<H: LocalDevice>(&mut self, host: &mut H) -> Step {
        host.send(&build_user_control_pressed(host.address(), self.target, self.key));
        Step::wait(STATE_PRESSED, millis(IRT_MS))
    }
}

impl<H: LocalDevice> FeatureAction<H> for SendKey {
    fn start(&mut self, host: &mut H) -> Step {
        self.send_pressed(host)
    }

    fn process_command(&mut self, _host: &mut H, _message: &CecMessage) -> Option<Step> {
        None
    }

    fn handle_timer_event(&mut self, host: &mut H, state: u32) -> Step {
        if state != STATE_PRESSED {
            return Step::Continue;
        }
        self.held_ms += IRT_MS;
        if self.held_ms >= AWAIT_RELEASE_KEY_MS {
            host.send(&build_user_control_released(host.address(), self.target));
            return Step::Finished;
        }
        self.send_pressed(host)
    }
}
