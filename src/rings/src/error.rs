use std::{fmt, path::PathBuf};

use caps::{errors::CapsError, Capability};

use crate::table::Ring;

#[derive(Debug)]
pub enum Error {
    AlreadyInitialized,
    NotInitialized,
    CapabilityQuery(CapsError),
    CapabilityCommit(CapsError),
    /// The ring asks for capabilities the permitted set does not hold, so
    /// raising them in the effective set could never succeed.
    NotPermitted {
        ring: Ring,
        missing: Vec<Capability>,
    },
    UnknownCapability(String),
    TunableRead {
        path: PathBuf,
        reason: String,
    },
    NestedWindow,
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyInitialized => write!(f, "capabilities were already initialized"),
            Error::NotInitialized => write!(f, "capabilities are not initialized"),
            Error::CapabilityQuery(e) => write!(f, "could not get capabilities: {}", e),
            Error::CapabilityCommit(e) => write!(f, "could not set capabilities: {}", e),
            Error::NotPermitted { ring, missing } => {
                write!(f, "{} ring needs capabilities outside the permitted set:", ring)?;
                for cap in missing {
                    write!(f, " {}", cap)?;
                }
                Ok(())
            }
            Error::UnknownCapability(name) => write!(f, "could not find capability: {}", name),
            Error::TunableRead { path, reason } => {
                write!(f, "could not read {}: {}", path.display(), reason)
            }
            Error::NestedWindow => write!(f, "a privilege ring is already active on this thread"),
            Error::Config(msg) => write!(f, "invalid capabilities configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CapabilityQuery(e) | Error::CapabilityCommit(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
