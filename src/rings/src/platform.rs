//! Access to the calling thread's capability state.
//!
//! Linux keeps effective/permitted sets per thread: a commit only changes the
//! thread that issued it. Whoever raises capabilities through this module has
//! to lower them again from the same OS thread.

use caps::{CapSet, Capability, CapsHashSet};

use crate::error::{Error, Result};

/// In-memory copy of a thread's capability sets.
///
/// Mutating a snapshot never touches the kernel; only
/// [`CapabilityPlatform::commit`] does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    effective: CapsHashSet,
    permitted: CapsHashSet,
}

impl Snapshot {
    pub fn new(effective: CapsHashSet, permitted: CapsHashSet) -> Self {
        Self {
            effective,
            permitted,
        }
    }

    pub fn effective(&self) -> &CapsHashSet {
        &self.effective
    }

    pub fn permitted(&self) -> &CapsHashSet {
        &self.permitted
    }

    pub fn is_permitted(&self, cap: Capability) -> bool {
        self.permitted.contains(&cap)
    }

    pub fn set_effective(&mut self, cap: Capability, on: bool) {
        if on {
            self.effective.insert(cap);
        } else {
            self.effective.remove(&cap);
        }
    }
}

pub trait CapabilityPlatform {
    /// Every capability the running kernel supports, by ascending index.
    fn known(&self) -> Vec<Capability>;
    fn query(&self) -> Result<Snapshot>;
    /// Writes the effective set of `snapshot` for the calling thread.
    fn commit(&self, snapshot: &Snapshot) -> Result<()>;
    /// Removes `cap` from the bounding set. There is no way back.
    fn drop_bounding(&self, cap: Capability) -> Result<()>;
}

/// The real thing, backed by capget(2)/capset(2)/prctl(2) through `caps`.
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    known: Vec<Capability>,
}

impl HostCapabilities {
    pub fn new() -> Self {
        Self {
            known: runtime_supported(),
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityPlatform for HostCapabilities {
    fn known(&self) -> Vec<Capability> {
        self.known.clone()
    }

    fn query(&self) -> Result<Snapshot> {
        let effective = caps::read(None, CapSet::Effective).map_err(Error::CapabilityQuery)?;
        let permitted = caps::read(None, CapSet::Permitted).map_err(Error::CapabilityQuery)?;
        Ok(Snapshot::new(effective, permitted))
    }

    fn commit(&self, snapshot: &Snapshot) -> Result<()> {
        caps::set(None, CapSet::Effective, snapshot.effective()).map_err(Error::CapabilityCommit)
    }

    fn drop_bounding(&self, cap: Capability) -> Result<()> {
        caps::drop(None, CapSet::Bounding, cap).map_err(Error::CapabilityCommit)
    }
}

/// Capabilities supported by the running kernel. procfs is asked first;
/// probing the current thread is the fallback when /proc is unavailable.
pub fn runtime_supported() -> Vec<Capability> {
    let supported = caps::runtime::procfs_all_supported(None).unwrap_or_else(|e| {
        logger::debug!("procfs capability introspection failed: {}", e);
        caps::runtime::thread_all_supported()
    });
    sorted(supported)
}

pub(crate) fn sorted<I: IntoIterator<Item = Capability>>(caps: I) -> Vec<Capability> {
    let mut caps = caps.into_iter().collect::<Vec<_>>();
    caps.sort_by_key(|c| c.index());
    caps.dedup();
    caps
}
