//! Candidate install locations for the backend executable.
//!
//! Pure path computation: nothing here touches the filesystem. The runtime
//! probe walks the list in order and falls back to a `$PATH` lookup of
//! [`BACKEND_BINARY_NAME`].

use std::path::{Path, PathBuf};

use crate::settings::BackendSettings;

/// File name of the backend executable.
#[cfg(target_os = "windows")]
pub const BACKEND_BINARY_NAME: &str = "gemi-server.exe";

/// File name of the backend executable.
#[cfg(not(target_os = "windows"))]
pub const BACKEND_BINARY_NAME: &str = "gemi-server";

/// Application directory name under the platform data dir.
pub const APP_DIR_NAME: &str = "Gemi";

/// File next to the executable holding its version string.
pub const VERSION_FILE_NAME: &str = "VERSION";

/// Directory the app manages its own copy of the backend in.
pub fn managed_bin_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join("bin"))
}

/// Ordered list of places to look for the backend.
///
/// Explicit override first, then configured extras, then the app-managed
/// copy, then conventional per-platform install locations.
pub fn candidate_paths(settings: &BackendSettings) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = &settings.binary_path {
        candidates.push(path.clone());
    }
    candidates.extend(settings.extra_candidates.iter().cloned());

    if let Some(dir) = managed_bin_dir() {
        candidates.push(dir.join(BACKEND_BINARY_NAME));
    }

    candidates.extend(platform_candidates());

    dedup_preserving_order(candidates)
}

/// Path of the version file belonging to `binary`.
pub fn version_file_for(binary: &Path) -> Option<PathBuf> {
    binary.parent().map(|dir| dir.join(VERSION_FILE_NAME))
}

#[cfg(target_os = "macos")]
fn platform_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(
        "/Applications/Gemi.app/Contents/Resources/GemiServer/GemiServer",
    )];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join("Applications/Gemi.app/Contents/Resources/GemiServer/GemiServer"));
        paths.push(home.join(".local/bin").join(BACKEND_BINARY_NAME));
    }
    paths.push(PathBuf::from("/opt/homebrew/bin").join(BACKEND_BINARY_NAME));
    paths.push(PathBuf::from("/usr/local/bin").join(BACKEND_BINARY_NAME));
    paths
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local/bin").join(BACKEND_BINARY_NAME));
    }
    paths.push(PathBuf::from("/usr/local/bin").join(BACKEND_BINARY_NAME));
    paths.push(PathBuf::from("/opt/gemi/bin").join(BACKEND_BINARY_NAME));
    paths
}

#[cfg(target_os = "windows")]
fn platform_candidates() -> Vec<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| vec![dir.join("Programs").join(APP_DIR_NAME).join(BACKEND_BINARY_NAME)])
        .unwrap_or_default()
}

fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = Vec::with_capacity(paths.len());
    for path in paths {
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_comes_first() {
        let settings = BackendSettings {
            binary_path: Some(PathBuf::from("/custom/gemi-server")),
            extra_candidates: vec![PathBuf::from("/extra/gemi-server")],
            ..BackendSettings::default()
        };
        let candidates = candidate_paths(&settings);
        assert_eq!(candidates[0], PathBuf::from("/custom/gemi-server"));
        assert_eq!(candidates[1], PathBuf::from("/extra/gemi-server"));
    }

    #[test]
    fn duplicates_are_removed() {
        let settings = BackendSettings {
            binary_path: Some(PathBuf::from("/same")),
            extra_candidates: vec![PathBuf::from("/same")],
            ..BackendSettings::default()
        };
        let candidates = candidate_paths(&settings);
        assert_eq!(candidates.iter().filter(|p| *p == Path::new("/same")).count(), 1);
    }

    #[test]
    fn version_file_sits_next_to_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join(BACKEND_BINARY_NAME);
        assert_eq!(
            version_file_for(&binary),
            Some(dir.path().join(VERSION_FILE_NAME))
        );
    }

    #[test]
    fn default_candidates_end_with_binary_name() {
        for path in candidate_paths(&BackendSettings::default()) {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            assert!(name.is_some(), "candidate without file name: {}", path.display());
        }
    }
}
