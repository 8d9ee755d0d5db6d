use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    bootstrap::PERF_EVENT_PARANOID_PATH,
    error::{Error, Result},
    platform::CapabilityPlatform,
    RingManager,
};

/// What the operator decided about capabilities: skip ring management
/// entirely, or adjust the required ring on top of the kernel baseline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfig {
    pub bypass: bool,
    /// Names added to the required ring.
    pub add: Vec<String>,
    /// Names removed from the required ring, applied after `add`.
    pub drop: Vec<String>,
    pub perf_event_paranoid: Option<PathBuf>,
}

impl RingConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Config(format!("failed to open {:?}: {}", path, e)))?;
        serde_json::from_reader(&file)
            .map_err(|e| Error::Config(format!("failed to load {:?}: {}", path, e)))
    }

    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> Result<Self> {
        let mut config = Self::default();
        config.merge_flags(flags)?;
        Ok(config)
    }

    /// Applies `bypass[=bool]`, `add=name[,name]` and `drop=name[,name]`
    /// flags on top of the current values.
    pub fn merge_flags<S: AsRef<str>>(&mut self, flags: &[S]) -> Result<()> {
        for flag in flags {
            let flag = flag.as_ref().trim();
            let (key, value) = match flag.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (flag, None),
            };
            match (key, value) {
                ("bypass", None) => self.bypass = true,
                ("bypass", Some(value)) => self.bypass = parse_bool(value)?,
                ("add", Some(names)) => self.add.extend(split_names(names)),
                ("drop", Some(names)) => self.drop.extend(split_names(names)),
                _ => return Err(Error::Config(format!("invalid flag {:?}", flag))),
            }
        }
        Ok(())
    }

    pub fn tunable_path(&self) -> &Path {
        self.perf_event_paranoid
            .as_deref()
            .unwrap_or_else(|| Path::new(PERF_EVENT_PARANOID_PATH))
    }

    /// Initializes a manager on `platform` and applies `add`/`drop`.
    pub fn build<P: CapabilityPlatform>(&self, platform: P) -> Result<RingManager<P>> {
        let manager = RingManager::with_tunable_path(platform, self.tunable_path());
        manager.initialize(self.bypass)?;
        manager.require_by_name(&self.add)?;
        manager.unrequire_by_name(&self.drop)?;
        Ok(manager)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!("{:?} is not a boolean", value))),
    }
}

fn split_names(names: &str) -> impl Iterator<Item = String> + '_ {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
}
