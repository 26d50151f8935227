//! Installation probe port.

use crate::domain::InstallationInfo;

/// Locates the backend executable on this host.
///
/// Implementations check a fixed, ordered list of candidate locations and
/// then fall back to a `$PATH` lookup. They have no side effects and never
/// fail: absence is reported as [`InstallationInfo::missing`].
pub trait InstallationProbe: Send + Sync {
    fn detect(&self) -> InstallationInfo;
}
