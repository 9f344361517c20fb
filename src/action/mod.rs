//! Actions: in-flight multi-step CEC sub-protocols
//!
//! Each action is a resumable state machine owned by a local device's
//! [`ActionScheduler`]. It advances on three kinds of input, all delivered on
//! the service thread:
//!
//! - `start`, called once when the action is added
//! - `process_command`, for every incoming message until one action consumes it
//! - `handle_timer_event`, when a timeout armed by a previous step expires
//!
//! Each step returns a [`Step`] telling the scheduler whether to keep the
//! action, arm a timeout, or drop it.

use std::fmt::Debug;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::protocol::{CecMessage, ControlResult};

pub mod audio;
pub mod discovery;
pub mod key;
pub mod playback;
pub mod record;
pub mod routing;
pub mod scheduler;
pub mod tv;

pub use playback::{PlaybackAction, PlaybackActionKind};
pub use scheduler::{ActionHost, ActionId, ActionScheduler};
pub use tv::{TvAction, TvActionKind};

/// What the scheduler should do with an action after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep the action; any armed timeout stays armed
    Continue,
    /// Keep the action and (re-)arm its timeout for `state`
    WaitFor { state: u32, timeout: Duration },
    /// Remove the action
    Finished,
}

impl Step {
    pub fn wait(state: u32, timeout: Duration) -> Self {
        Step::WaitFor { state, timeout }
    }
}

/// Actions are grouped into kinds for lookup and mutual exclusion
pub trait Classified {
    type Kind: Copy + Eq + Debug;

    fn kind(&self) -> Self::Kind;
}

/// Step functions of an action running on host `H`
pub trait FeatureAction<H> {
    fn start(&mut self, host: &mut H) -> Step;

    /// `None` when the message is not for this action
    fn process_command(&mut self, host: &mut H, message: &CecMessage) -> Option<Step>;

    fn handle_timer_event(&mut self, host: &mut H, state: u32) -> Step;
}

/// One-shot completion callback
///
/// Dropping an uninvoked callback closes the channel; the caller sees that
/// as the action having been cancelled.
#[derive(Debug)]
pub struct Callback<T = ControlResult>(Option<oneshot::Sender<T>>);

impl<T> Callback<T> {
    pub fn new(tx: oneshot::Sender<T>) -> Self {
        Self(Some(tx))
    }

    /// No one is waiting for the result
    pub fn none() -> Self {
        Self(None)
    }

    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    /// Deliver the result. Later calls are no-ops.
    pub fn invoke(&mut self, result: T) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(result);
        }
    }
}

impl<T> Default for Callback<T> {
    fn default() -> Self {
        Self::none()
    }
}

/// Declare a closed set of actions for one host: the enum, its kind enum and
/// the delegating trait impls.
macro_rules! action_set {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:ident, $host:ty {
            $($variant:ident($ty:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $($variant($ty)),+
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $kind {
            $($variant),+
        }

        impl $crate::action::Classified for $name {
            type Kind = $kind;

            fn kind(&self) -> $kind {
                match self {
                    $($name::$variant(_) => $kind::$variant),+
                }
            }
        }

        impl $crate::action::FeatureAction<$host> for $name {
            fn start(&mut self, host: &mut $host) -> $crate::action::Step {
                match self {
                    $($name::$variant(action) => {
                        $crate::action::FeatureAction::<$host>::start(action, host)
                    }),+
                }
            }

            fn process_command(
                &mut self,
                host: &mut $host,
                message: &$crate::protocol::CecMessage,
            ) -> Option<$crate::action::Step> {
                match self {
                    $($name::$variant(action) => {
                        $crate::action::FeatureAction::<$host>::process_command(action, host, message)
                    }),+
                }
            }

            fn handle_timer_event(&mut self, host: &mut $host, state: u32) -> $crate::action::Step {
                match self {
                    $($name::$variant(action) => {
                        $crate::action::FeatureAction::<$host>::handle_timer_event(action, host, state)
                    }),+
                }
            }
        }
    };
}

pub(crate) use action_set;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_invoked_once() {
        let (mut callback, mut rx) = Callback::channel();
        callback.invoke(ControlResult::Success);
        callback.invoke(ControlResult::Timeout);
        assert_eq!(rx.try_recv().unwrap(), ControlResult::Success);
    }

    #[test]
    fn test_dropped_callback_closes_channel() {
        let (callback, mut rx) = Callback::<ControlResult>::channel();
        drop(callback);
        assert!(rx.try_recv().is_err());
    }
}
