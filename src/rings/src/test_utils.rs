use std::{io::Write, sync::Mutex};

use caps::{errors::CapsError, Capability, CapsHashSet};
use tempfile::NamedTempFile;

use crate::{
    error::{Error, Result},
    platform::{sorted, CapabilityPlatform, Snapshot},
};

#[derive(Debug, Default)]
struct FakeState {
    effective: CapsHashSet,
    permitted: CapsHashSet,
    bounding: CapsHashSet,
    commits: Vec<CapsHashSet>,
    queries: usize,
    drops: usize,
    fail_query: bool,
    fail_commit: bool,
}

/// In-memory stand-in for the kernel. Commits follow capset(2) rules: the
/// effective set has to stay inside the permitted set.
#[derive(Debug)]
pub struct FakeCapabilities {
    known: Vec<Capability>,
    state: Mutex<FakeState>,
}

impl FakeCapabilities {
    pub fn new(permitted: &[Capability]) -> Self {
        let known = sorted(caps::all());
        let state = FakeState {
            effective: permitted.iter().copied().collect(),
            permitted: permitted.iter().copied().collect(),
            bounding: known.iter().copied().collect(),
            ..FakeState::default()
        };
        Self {
            known,
            state: Mutex::new(state),
        }
    }

    /// Everything permitted and effective, like a process started as root.
    pub fn root() -> Self {
        Self::new(&sorted(caps::all()))
    }

    /// Root, minus CAP_BPF in the permitted set.
    pub fn root_without_bpf() -> Self {
        let permitted = sorted(caps::all())
            .into_iter()
            .filter(|c| *c != Capability::CAP_BPF)
            .collect::<Vec<_>>();
        Self::new(&permitted)
    }

    pub fn effective(&self) -> CapsHashSet {
        self.state.lock().unwrap().effective.clone()
    }

    pub fn bounding(&self) -> CapsHashSet {
        self.state.lock().unwrap().bounding.clone()
    }

    pub fn commits(&self) -> Vec<CapsHashSet> {
        self.state.lock().unwrap().commits.clone()
    }

    /// Number of calls that reached the "kernel".
    pub fn touches(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.queries + state.commits.len() + state.drops
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_query = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().unwrap().fail_commit = fail;
    }
}

impl CapabilityPlatform for FakeCapabilities {
    fn known(&self) -> Vec<Capability> {
        self.known.clone()
    }

    fn query(&self) -> Result<Snapshot> {
        let mut state = self.state.lock().unwrap();
        if state.fail_query {
            return Err(Error::CapabilityQuery(CapsError::from("capget: EPERM")));
        }
        state.queries += 1;
        Ok(Snapshot::new(state.effective.clone(), state.permitted.clone()))
    }

    fn commit(&self, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commit || !snapshot.effective().is_subset(&state.permitted) {
            return Err(Error::CapabilityCommit(CapsError::from("capset: EPERM")));
        }
        state.effective = snapshot.effective().clone();
        state.commits.push(snapshot.effective().clone());
        Ok(())
    }

    fn drop_bounding(&self, cap: Capability) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.drops += 1;
        state.bounding.remove(&cap);
        Ok(())
    }
}

/// A temp file holding `content`, removed when dropped.
pub fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}
