//! Filesystem-backed [`InstallationProbe`].

use gemi_core::paths::{BACKEND_BINARY_NAME, candidate_paths, version_file_for};
use gemi_core::{BackendSettings, InstallationInfo, InstallationProbe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Why a candidate location was skipped.
#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("cannot read metadata for {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Looks for the backend in an ordered candidate list, then on `$PATH`.
#[derive(Debug, Clone)]
pub struct FsInstallationProbe {
    candidates: Vec<PathBuf>,
    search_path: bool,
}

impl FsInstallationProbe {
    /// Probe using the standard candidate list for `settings`.
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            candidates: candidate_paths(settings),
            search_path: true,
        }
    }

    /// Probe that checks exactly `candidates` and nothing else.
    pub const fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            search_path: false,
        }
    }

    /// Enable or disable the `$PATH` fallback.
    #[must_use]
    pub const fn search_path(mut self, enabled: bool) -> Self {
        self.search_path = enabled;
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    fn found(path: &Path) -> InstallationInfo {
        let version = read_version(path);
        debug!(path = %path.display(), version = ?version, "Found backend binary");
        InstallationInfo::found(path, version)
    }
}

impl InstallationProbe for FsInstallationProbe {
    fn detect(&self) -> InstallationInfo {
        for candidate in &self.candidates {
            match validate_binary(candidate) {
                Ok(()) => return Self::found(candidate),
                Err(reason) => trace!("Skipping candidate: {}", reason),
            }
        }

        if self.search_path {
            if let Ok(path) = which::which(BACKEND_BINARY_NAME) {
                if validate_binary(&path).is_ok() {
                    return Self::found(&path);
                }
            }
        }

        debug!(
            checked = self.candidates.len(),
            "Backend binary not found in any candidate location"
        );
        InstallationInfo::missing()
    }
}

/// Check that `path` is an existing, executable regular file.
pub fn validate_binary(path: &Path) -> Result<(), BinaryError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BinaryError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(BinaryError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_file() {
        return Err(BinaryError::NotAFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Any execute bit (owner, group, or other)
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(BinaryError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Read the version string shipped next to `binary`, if any.
pub fn read_version(binary: &Path) -> Option<String> {
    let file = version_file_for(binary)?;
    let contents = std::fs::read_to_string(file).ok()?;
    let version = contents.lines().next()?.trim();
    (!version.is_empty()).then(|| version.to_string())
}
