//! Where (and whether) the backend executable lives on this host.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of an installation probe.
///
/// Absence is a normal outcome, not an error: `found == false` simply means
/// the user still has to install the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationInfo {
    /// Whether an executable backend was located.
    pub found: bool,
    /// Location of the executable, when found.
    pub path: Option<PathBuf>,
    /// Version string shipped alongside the executable, if any.
    pub version: Option<String>,
}

impl InstallationInfo {
    /// Backend located at `path`.
    pub fn found(path: impl Into<PathBuf>, version: Option<String>) -> Self {
        Self {
            found: true,
            path: Some(path.into()),
            version,
        }
    }

    /// No backend on this host.
    pub const fn missing() -> Self {
        Self {
            found: false,
            path: None,
            version: None,
        }
    }

    /// Path to launch, if one was found.
    pub fn executable(&self) -> Option<&PathBuf> {
        self.path.as_ref().filter(|_| self.found)
    }
}
