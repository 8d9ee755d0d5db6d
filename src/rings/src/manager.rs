//! The ring state machine.
//!
//! ```text
//!   Unprivileged ──run_privileged──▶ Privileged ──┐
//!        ▲      ──run_required───▶ Required   ──┤ callback done (or failed)
//!        │      ──run_requested──▶ Requested  ──┤
//!        └──────────────────────────────────────┘
//! ```
//!
//! One lock serializes every transition, so at most one elevated window is
//! open in the process at any time. The window is opened and closed on the
//! calling thread; the lock guard is not `Send`, which keeps callers from
//! moving the window elsewhere halfway through.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use caps::Capability;
use nix::unistd::gettid;
use once_cell::sync::OnceCell;

use crate::{
    bootstrap::{self, PERF_EVENT_PARANOID_PATH},
    error::{Error, Result},
    names,
    platform::{CapabilityPlatform, HostCapabilities},
    table::{MembershipTable, Ring},
};

enum Mode {
    Bypass,
    Managed(Mutex<Rings>),
}

struct Rings {
    table: MembershipTable,
    active: Ring,
}

/// Owns the capability rings of the process.
///
/// Build one at startup, call [`RingManager::initialize`] once, and hand
/// references to whatever needs to run something with privileges.
pub struct RingManager<P = HostCapabilities> {
    platform: P,
    tunable: PathBuf,
    mode: OnceCell<Mode>,
    // OS thread currently inside an elevated window, 0 when none.
    window_owner: AtomicI32,
}

impl RingManager<HostCapabilities> {
    pub fn host() -> Self {
        Self::new(HostCapabilities::new())
    }
}

impl<P: CapabilityPlatform> RingManager<P> {
    pub fn new(platform: P) -> Self {
        Self::with_tunable_path(platform, PERF_EVENT_PARANOID_PATH)
    }

    /// Reads the perf_event_paranoid level from `tunable` instead of procfs.
    pub fn with_tunable_path<T: Into<PathBuf>>(platform: P, tunable: T) -> Self {
        Self {
            platform,
            tunable: tunable.into(),
            mode: OnceCell::new(),
            window_owner: AtomicI32::new(0),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Hardens the process and settles in the unprivileged ring.
    ///
    /// With `bypass`, nothing is touched and every later call degrades to
    /// running its callback directly. Otherwise every known capability is
    /// dropped from the bounding set, the required ring is seeded from the
    /// running kernel, and the effective set is emptied.
    ///
    /// A failure leaves the manager uninitialized. Only one call can succeed.
    pub fn initialize(&self, bypass: bool) -> Result<()> {
        let mut fresh = false;
        self.mode.get_or_try_init(|| {
            fresh = true;
            if bypass {
                logger::info!("capabilities bypassed: running with the privileges of the caller");
                return Ok(Mode::Bypass);
            }
            self.harden().map(|rings| Mode::Managed(Mutex::new(rings)))
        })?;
        if fresh {
            Ok(())
        } else {
            Err(Error::AlreadyInitialized)
        }
    }

    fn harden(&self) -> Result<Rings> {
        let mut table = MembershipTable::new(&self.platform.known());
        let snapshot = self.platform.query()?;
        for cap in table.capabilities() {
            self.platform.drop_bounding(cap)?;
        }
        self.platform.commit(&snapshot)?;

        bootstrap::seed_required(&mut table, &snapshot, &self.tunable)?;

        let mut rings = Rings {
            table,
            active: Ring::Privileged,
        };
        self.apply(&mut rings, Ring::Unprivileged)?;
        Ok(rings)
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self.mode.get(), Some(Mode::Bypass))
    }

    /// The ring last applied, `None` when bypassed.
    pub fn active_ring(&self) -> Result<Option<Ring>> {
        Ok(self.lock()?.map(|rings| rings.active))
    }

    /// Members of `ring`, by ascending capability index. Empty when bypassed.
    pub fn members(&self, ring: Ring) -> Result<Vec<Capability>> {
        Ok(self
            .lock()?
            .map(|rings| rings.table.members(ring))
            .unwrap_or_default())
    }

    pub fn known(&self) -> Vec<Capability> {
        self.platform.known()
    }

    /// Adds `caps` to the required ring. Takes effect the next time the
    /// required ring is entered.
    pub fn require(&self, caps: &[Capability]) -> Result<()> {
        match self.lock()? {
            Some(mut rings) => rings.table.set(Ring::Required, caps),
            None => Ok(()),
        }
    }

    /// Removes `caps` from the required ring.
    pub fn unrequire(&self, caps: &[Capability]) -> Result<()> {
        match self.lock()? {
            Some(mut rings) => rings.table.unset(Ring::Required, caps),
            None => Ok(()),
        }
    }

    pub fn require_by_name<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        if self.is_bypassed() {
            return Ok(());
        }
        self.require(&names::resolve_by_name(&self.known(), names)?)
    }

    pub fn unrequire_by_name<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        if self.is_bypassed() {
            return Ok(());
        }
        self.unrequire(&names::resolve_by_name(&self.known(), names)?)
    }

    /// Runs `f` with every permitted capability effective.
    pub fn run_privileged<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.run_in(Ring::Privileged, &[], f)
    }

    /// Runs `f` with exactly the required ring effective.
    pub fn run_required<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.run_in(Ring::Required, &[], f)
    }

    /// Runs `f` with exactly `caps` effective. The requested ring is
    /// forgotten as soon as it has been applied.
    pub fn run_requested<T, E, F>(&self, caps: &[Capability], f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.run_in(Ring::Requested, caps, f)
    }

    pub fn run_requested_by_name<S, T, E, F>(&self, names: &[S], f: F) -> std::result::Result<T, E>
    where
        S: AsRef<str>,
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        if self.is_bypassed() {
            return f();
        }
        let caps = names::resolve_by_name(&self.known(), names)?;
        self.run_requested(&caps, f)
    }

    fn run_in<T, E, F>(
        &self,
        ring: Ring,
        requested: &[Capability],
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut rings = match self.lock()? {
            Some(rings) => rings,
            None => return f(),
        };

        if ring == Ring::Requested {
            rings.table.set(Ring::Requested, requested)?;
            let applied = self.apply(&mut rings, Ring::Requested);
            rings.table.clear(Ring::Requested)?;
            applied?;
        } else {
            self.apply(&mut rings, ring)?;
        }

        let window = Window::open(self, rings);
        let result = f();
        if let Err(e) = window.close() {
            if result.is_err() {
                logger::warn!("callback failed in the {} ring, restoring failed too", ring);
            }
            return Err(e.into());
        }
        result
    }

    /// `None` means bypass.
    fn lock(&self) -> Result<Option<MutexGuard<'_, Rings>>> {
        match self.mode.get() {
            None => Err(Error::NotInitialized),
            Some(Mode::Bypass) => Ok(None),
            Some(Mode::Managed(rings)) => {
                if self.window_owner.load(Ordering::SeqCst) == gettid().as_raw() {
                    return Err(Error::NestedWindow);
                }
                // A panicking callback poisons the lock only after its window
                // was closed, so the table is consistent.
                Ok(Some(rings.lock().unwrap_or_else(PoisonError::into_inner)))
            }
        }
    }

    // The commit is all or nothing: on error the previous ring stays active.
    fn apply(&self, rings: &mut Rings, ring: Ring) -> Result<()> {
        let mut snapshot = self.platform.query()?;
        logger::debug!("capabilities change to the {} ring (tid {})", ring, gettid());

        let mut missing = Vec::new();
        for cap in rings.table.capabilities() {
            let mut on = rings.table.is_member(cap, ring);
            if on && !snapshot.is_permitted(cap) {
                // "Everything" means everything this process may hold.
                if ring != Ring::Privileged {
                    missing.push(cap);
                }
                on = false;
            }
            if on {
                logger::trace!("enabling {}", cap);
            }
            snapshot.set_effective(cap, on);
        }
        if !missing.is_empty() {
            return Err(Error::NotPermitted { ring, missing });
        }

        self.platform.commit(&snapshot)?;
        rings.active = ring;
        Ok(())
    }
}

/// An open elevated window. Dropping it without [`Window::close`] (the
/// callback panicked) still goes back to the unprivileged ring.
struct Window<'a, P: CapabilityPlatform> {
    manager: &'a RingManager<P>,
    rings: MutexGuard<'a, Rings>,
    closed: bool,
}

impl<'a, P: CapabilityPlatform> Window<'a, P> {
    fn open(manager: &'a RingManager<P>, rings: MutexGuard<'a, Rings>) -> Self {
        manager
            .window_owner
            .store(gettid().as_raw(), Ordering::SeqCst);
        Self {
            manager,
            rings,
            closed: false,
        }
    }

    fn close(mut self) -> Result<()> {
        self.closed = true;
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        let res = self.manager.apply(&mut self.rings, Ring::Unprivileged);
        self.manager.window_owner.store(0, Ordering::SeqCst);
        res
    }
}

impl<'a, P: CapabilityPlatform> Drop for Window<'a, P> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.restore() {
            logger::error!("could not leave the {} ring: {}", self.rings.active, e);
        }
    }
}
