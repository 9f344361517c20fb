//! Device registry
//!
//! Tracks every CEC device known to the TV, keyed by logical address.
//!
//! ```text
//!     service thread                       any thread
//!  ┌────────────────────┐   publish    ┌──────────────────┐
//!  │ DeviceRegistry      │ ──────────► │ DeviceSnapshot    │
//!  │  devices: BTreeMap  │  (RwLock)   │  all / inputs     │
//!  │  cache              │             │  (Arc<Vec<..>>)   │
//!  └────────────────────┘              └──────────────────┘
//! ```

pub mod cache;
pub mod entry;
pub mod store;

pub use cache::MessageCache;
pub use entry::DeviceInfo;
pub use store::{DeviceRegistry, DeviceSnapshot};
