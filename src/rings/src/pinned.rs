//! Keeping an elevated window on one OS thread.
//!
//! Capabilities belong to OS threads. Code whose execution can hop between
//! threads (a task on a work-stealing executor, a coroutine) must not open a
//! window directly; it hands the whole run-in-ring call to
//! [`on_dedicated_thread`] instead.

use std::panic;

/// Runs `f` to completion on a freshly spawned OS thread and returns its
/// result. A panic in `f` is resumed on the caller.
///
/// The new thread starts with the capabilities of the caller at spawn time,
/// so call this from a thread that sits in the unprivileged ring.
pub fn on_dedicated_thread<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    std::thread::scope(|s| match s.spawn(f).join() {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    })
}
