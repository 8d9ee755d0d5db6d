use std::fmt;

use caps::{Capability, CapsHashSet};
use crate::error::{Error, Result};

/// Protection levels, from ring0 (everything) to ring3 (nothing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ring {
    /// Startup and shutdown only.
    Privileged,
    /// The configuration-time set.
    Required,
    /// A single-use set handed in per call.
    Requested,
    /// Steady state.
    Unprivileged,
}

const RING_COUNT: usize = 4;

impl Ring {
    pub const ALL: [Ring; RING_COUNT] = [
        Ring::Privileged,
        Ring::Required,
        Ring::Requested,
        Ring::Unprivileged,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Only these columns may be edited; the other two are fixed at all/none.
    pub fn is_configurable(self) -> bool {
        matches!(self, Ring::Required | Ring::Requested)
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ring::Privileged => "privileged",
            Ring::Required => "required",
            Ring::Requested => "requested",
            Ring::Unprivileged => "unprivileged",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Ring {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ring::ALL
            .iter()
            .copied()
            .find(|r| r.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown ring {:?}", s)))
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    cap: Capability,
    rings: [bool; RING_COUNT],
}

/// Which capability belongs to which ring.
///
/// Rows are the capabilities known at construction, kept in index order.
/// The privileged column is all true and the unprivileged column all false
/// for the lifetime of the table.
#[derive(Clone, Debug)]
pub struct MembershipTable {
    entries: Vec<Entry>,
}

impl MembershipTable {
    pub fn new(known: &[Capability]) -> Self {
        let entries = crate::platform::sorted(known.iter().copied())
            .into_iter()
            .map(|cap| {
                let mut rings = [false; RING_COUNT];
                rings[Ring::Privileged.slot()] = true;
                Entry { cap, rings }
            })
            .collect();
        Self { entries }
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.entries.iter().map(|e| e.cap)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.entry(cap).is_some()
    }

    pub fn is_member(&self, cap: Capability, ring: Ring) -> bool {
        self.entry(cap).map_or(false, |e| e.rings[ring.slot()])
    }

    /// Capabilities of `ring`, by ascending index.
    pub fn members(&self, ring: Ring) -> Vec<Capability> {
        self.entries
            .iter()
            .filter(|e| e.rings[ring.slot()])
            .map(|e| e.cap)
            .collect()
    }

    pub fn column(&self, ring: Ring) -> CapsHashSet {
        self.members(ring).into_iter().collect()
    }

    pub fn set(&mut self, ring: Ring, caps: &[Capability]) -> Result<()> {
        self.update(ring, caps, true)
    }

    pub fn unset(&mut self, ring: Ring, caps: &[Capability]) -> Result<()> {
        self.update(ring, caps, false)
    }

    /// Empties a configurable column.
    pub fn clear(&mut self, ring: Ring) -> Result<()> {
        self.check_configurable(ring)?;
        for entry in self.entries.iter_mut() {
            entry.rings[ring.slot()] = false;
        }
        Ok(())
    }

    // All-or-nothing: a single unknown capability leaves the column untouched.
    fn update(&mut self, ring: Ring, caps: &[Capability], on: bool) -> Result<()> {
        self.check_configurable(ring)?;
        if let Some(unknown) = caps.iter().find(|c| !self.contains(**c)) {
            return Err(Error::UnknownCapability(unknown.to_string()));
        }
        for cap in caps {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.cap == *cap) {
                entry.rings[ring.slot()] = on;
            }
        }
        Ok(())
    }

    fn check_configurable(&self, ring: Ring) -> Result<()> {
        if ring.is_configurable() {
            Ok(())
        } else {
            Err(Error::Config(format!("the {} ring cannot be edited", ring)))
        }
    }

    fn entry(&self, cap: Capability) -> Option<&Entry> {
        self.entries.iter().find(|e| e.cap == cap)
    }
}
