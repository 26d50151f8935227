//! Handle to the backend process the supervisor is tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is responsible for the backend process' lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Spawned by this supervisor; terminated on stop/teardown.
    Owned,
    /// Already running when we looked; never terminated by us.
    External,
}

/// Opaque reference to the backend process.
///
/// The supervisor keeps the OS-level child internally; callers only ever
/// hold this descriptor, so they cannot outlive or duplicate the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    /// OS process ID (unknown for externally managed backends).
    pub pid: Option<u32>,
    /// When the process was spawned, or first observed if external.
    pub started_at: DateTime<Utc>,
    /// Lifetime responsibility.
    pub ownership: Ownership,
}

impl ProcessHandle {
    /// Handle for a process this supervisor spawned.
    pub fn owned(pid: Option<u32>) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            ownership: Ownership::Owned,
        }
    }

    /// Handle representing a backend someone else started.
    pub fn external() -> Self {
        Self {
            pid: None,
            started_at: Utc::now(),
            ownership: Ownership::External,
        }
    }

    /// Whether this supervisor must terminate the process.
    pub const fn is_owned(&self) -> bool {
        matches!(self.ownership, Ownership::Owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_handles_are_not_owned() {
        assert!(!ProcessHandle::external().is_owned());
        assert!(ProcessHandle::owned(Some(42)).is_owned());
    }
}
