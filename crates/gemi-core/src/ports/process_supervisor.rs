//! Process supervisor port.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::ProcessHandle;

/// Why the backend could not be brought up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// The OS refused to start the process.
    #[error("failed to spawn {}: {reason}", path.display())]
    SpawnFailed {
        path: PathBuf,
        reason: String,
        /// Worth trying again (e.g. binary briefly busy after an update).
        transient: bool,
    },

    /// The process exited before any probe succeeded.
    #[error("backend exited before becoming healthy ({status})")]
    CrashedEarly { status: String },

    /// The configured path does not point at an executable.
    #[error("backend binary missing or not executable: {}", .0.display())]
    BinaryMissing(PathBuf),
}

impl LaunchError {
    /// Whether launching again immediately might succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SpawnFailed { transient: true, .. })
    }
}

/// Owns the backend subprocess.
///
/// At most one live process per supervisor. Handles returned here are
/// descriptors; the OS-level child never leaves the implementation.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Return a handle to a running backend, spawning `binary` if needed.
    ///
    /// A backend that is already reachable yields an external handle and is
    /// never spawned or killed. Calling this while an owned child is alive
    /// returns the same handle instead of launching a second process. Does
    /// not wait for readiness.
    async fn ensure_running(&self, binary: &Path) -> Result<ProcessHandle, LaunchError>;

    /// Whether the process behind `handle` is still running.
    ///
    /// External handles are always reported alive; reachability decides.
    async fn is_alive(&self, handle: &ProcessHandle) -> bool;

    /// Record that `handle` answered a probe. Exits after this point are
    /// ordinary crashes, not [`LaunchError::CrashedEarly`].
    async fn confirm_healthy(&self, handle: &ProcessHandle);

    /// Terminate the process if we own it; disown it otherwise.
    async fn stop(&self, handle: &ProcessHandle);

    /// Terminate whatever this supervisor currently owns.
    async fn shutdown(&self);
}
