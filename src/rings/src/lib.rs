//! Privilege rings for a process that must hold no capabilities most of the
//! time and only a bounded set for short, well-delimited operations.
//!
//! ```no_run
//! use rings::{RingManager, Error};
//!
//! let manager = RingManager::host();
//! manager.initialize(false)?;
//! manager.require_by_name(&["cap_net_raw"])?;
//! manager.run_required(|| {
//!     // open raw sockets, load probes, ...
//!     Ok::<_, Error>(())
//! })?;
//! # Ok::<_, Error>(())
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod manager;
pub mod names;
pub mod pinned;
pub mod platform;
pub mod table;

#[cfg(test)]
mod test_utils;

pub use caps::Capability;
pub use config::RingConfig;
pub use error::{Error, Result};
pub use manager::RingManager;
pub use names::{list_available, resolve_by_name};
pub use platform::{CapabilityPlatform, HostCapabilities, Snapshot};
pub use table::{MembershipTable, Ring};
