//! Installer port.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::InstallationInfo;

/// Errors from an install action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstallError {
    /// No installer is wired into this build.
    #[error("no installer available; install the backend manually")]
    Unavailable,

    /// The installer ran and failed.
    #[error("install failed: {0}")]
    Failed(String),
}

/// Performs the external install action.
///
/// The result re-enters the lifecycle at `Checking`; the returned info is
/// advisory and the next probe is authoritative.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn perform_install(&self) -> Result<InstallationInfo, InstallError>;
}

/// Installer for builds without an install action.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

#[async_trait]
impl Installer for NoopInstaller {
    async fn perform_install(&self) -> Result<InstallationInfo, InstallError> {
        Err(InstallError::Unavailable)
    }
}
