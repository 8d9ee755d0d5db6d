//! Mapping between capability names and values.
//!
//! Names are matched without regard to case, and the `CAP_` prefix is
//! optional, so `CAP_SYS_ADMIN`, `cap_sys_admin` and `sys_admin` all resolve
//! to the same capability.

use caps::Capability;

use crate::{
    error::{Error, Result},
    platform,
};

/// Resolves every name against `known`. Fails on the first name that does
/// not match, reporting it as it was given.
pub fn resolve_by_name<S: AsRef<str>>(
    known: &[Capability],
    names: &[S],
) -> Result<Vec<Capability>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            lookup(known, name).ok_or_else(|| Error::UnknownCapability(name.to_string()))
        })
        .collect()
}

/// Canonical names of `known`, by ascending capability index.
pub fn list_available(known: &[Capability]) -> Vec<String> {
    platform::sorted(known.iter().copied())
        .into_iter()
        .map(|c| c.to_string())
        .collect()
}

/// [`resolve_by_name`] against the capabilities of the running kernel.
pub fn resolve_host<S: AsRef<str>>(names: &[S]) -> Result<Vec<Capability>> {
    resolve_by_name(&platform::runtime_supported(), names)
}

/// [`list_available`] for the running kernel.
pub fn list_host() -> Vec<String> {
    list_available(&platform::runtime_supported())
}

fn lookup(known: &[Capability], name: &str) -> Option<Capability> {
    let wanted = canonical(name)?;
    known.iter().copied().find(|c| c.to_string() == wanted)
}

fn canonical(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let upper = name.to_ascii_uppercase();
    if upper.starts_with("CAP_") {
        Some(upper)
    } else {
        Some(format!("CAP_{}", upper))
    }
}
