//! CEC service: the actor thread owning the local devices, and the handle
//! used to talk to it
//!
//! ```text
//!   CecHandle (any thread)            service thread
//!  ┌──────────────────────┐  mpsc  ┌───────────────────────────┐
//!  │ requests, frames     │ ─────► │ CecService                │
//!  │                      │ ◄───── │  TvController             │
//!  │ snapshot, events     │ oneshot│  PlaybackController       │
//!  └──────────────────────┘        └───────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod hal;
mod handle;
mod runner;

pub use config::CecConfig;
pub use hal::Collaborators;
pub use handle::CecHandle;
pub use runner::CecService;
