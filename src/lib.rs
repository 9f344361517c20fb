//! HDMI-CEC control library
//!
//! Implements the TV-side (and playback-side) control logic that sits on top
//! of a CEC bus transport:
//!
//! - Device registry with a thread-safe published snapshot
//! - Active source and routing path tracking
//! - System audio mode and Audio Return Channel negotiation
//! - A cooperative run-list of in-flight protocol actions
//! - One-touch and timer recording requests
//!
//! All protocol state lives on a single service thread. Callers talk to it
//! through a [`CecHandle`], which is `Send + Clone` and posts commands into the
//! service mailbox.
//!
//! ```no_run
//! use hdmi_cec::{CecConfig, CecService, Collaborators};
//! # fn collaborators() -> Collaborators { unimplemented!() }
//!
//! # async fn example() -> hdmi_cec::error::Result<()> {
//! let (handle, _thread) = CecService::spawn(CecConfig::default(), collaborators())?;
//! let mut events = handle.subscribe();
//! handle.set_system_audio_mode(true).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod audio;
pub mod device;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod routing;
pub mod service;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{CecEvent, EventBus};
pub use protocol::{CecMessage, ControlResult, DeviceType, LogicalAddress};
pub use registry::{DeviceInfo, DeviceRegistry};
pub use service::{hal, CecConfig, CecHandle, CecService, Collaborators};
