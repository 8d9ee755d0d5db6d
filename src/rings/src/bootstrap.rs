//! Baseline contents of the required ring.
//!
//! Loading instrumentation needs a different capability mix depending on the
//! kernel: v5.8+ (and some backporting distributions) accept CAP_BPF plus
//! CAP_PERFMON, anything older or configured with a strict
//! perf_event_paranoid still wants CAP_SYS_ADMIN.

use std::path::Path;

use caps::Capability;

use crate::{
    error::{Error, Result},
    platform::Snapshot,
    table::{MembershipTable, Ring},
};

pub const PERF_EVENT_PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

// perf event paranoia levels:
//  -1 not paranoid at all
//   0 disallow raw tracepoint access for unpriv
//   1 disallow cpu events for unpriv
//   2 disallow kernel profiling for unpriv
//   4 disallow all unpriv perf event use (not in all distros)
pub const MAX_PARANOIA_LEVEL: i32 = 4;

const ALWAYS_REQUIRED: [Capability; 2] = [Capability::CAP_IPC_LOCK, Capability::CAP_SYS_RESOURCE];

pub fn read_paranoia(path: &Path) -> Result<i32> {
    let tunable_error = |reason: String| Error::TunableRead {
        path: path.to_path_buf(),
        reason,
    };
    let value = std::fs::read_to_string(path).map_err(|e| tunable_error(e.to_string()))?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|e| tunable_error(format!("{:?}: {}", value.trim(), e)))
}

/// Like [`read_paranoia`], but any failure reads as the most restrictive level.
pub fn paranoia_or_max(path: &Path) -> i32 {
    read_paranoia(path).unwrap_or_else(|e| {
        logger::debug!("{}, assuming paranoia level {}", e, MAX_PARANOIA_LEVEL);
        MAX_PARANOIA_LEVEL
    })
}

/// The required ring for a kernel with the given paranoia level, depending on
/// whether CAP_BPF is in the (already hardened) permitted set.
pub fn baseline(paranoia: i32, permitted_bpf: bool) -> Vec<Capability> {
    let mut required = ALWAYS_REQUIRED.to_vec();
    if paranoia > 2 {
        logger::debug!(
            "perf_event_paranoid is {} (> 2): CAP_SYS_ADMIN is needed instead of CAP_BPF + CAP_PERFMON",
            paranoia
        );
        logger::debug!("set perf_event_paranoid to 2 or less to change that");
        required.push(Capability::CAP_SYS_ADMIN);
    } else if permitted_bpf {
        required.push(Capability::CAP_BPF);
        required.push(Capability::CAP_PERFMON);
    } else {
        required.push(Capability::CAP_SYS_ADMIN);
    }
    required
}

/// Seeds the required column of `table`. Baseline capabilities the running
/// kernel does not know about are left out.
pub fn seed_required(
    table: &mut MembershipTable,
    snapshot: &Snapshot,
    tunable: &Path,
) -> Result<()> {
    let paranoia = paranoia_or_max(tunable);
    let wanted = baseline(paranoia, snapshot.is_permitted(Capability::CAP_BPF));
    let (known, unknown): (Vec<_>, Vec<_>) = wanted.into_iter().partition(|c| table.contains(*c));
    for cap in unknown {
        logger::debug!("{} is not supported by the running kernel, not requiring it", cap);
    }
    table.set(Ring::Required, &known)
}
