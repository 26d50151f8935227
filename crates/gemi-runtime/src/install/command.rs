//! [`Installer`] that runs an external install command.

use async_trait::async_trait;
use gemi_core::{InstallError, InstallationInfo, InstallationProbe, Installer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs an installer program, then re-detects the backend.
pub struct CommandInstaller {
    program: PathBuf,
    args: Vec<String>,
    probe: Arc<dyn InstallationProbe>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<PathBuf>, probe: Arc<dyn InstallationProbe>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            probe,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn perform_install(&self) -> Result<InstallationInfo, InstallError> {
        info!(program = %self.program.display(), "Running backend installer");

        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                InstallError::Failed(format!("cannot run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim().to_string();
            warn!(status = %output.status, "Installer failed: {}", detail);
            return Err(InstallError::Failed(if detail.is_empty() {
                format!("installer exited with {}", output.status)
            } else {
                detail
            }));
        }

        let probe = Arc::clone(&self.probe);
        let info = tokio::task::spawn_blocking(move || probe.detect())
            .await
            .map_err(|e| InstallError::Failed(format!("detection task failed: {e}")))?;

        if !info.found {
            return Err(InstallError::Failed(
                "installer finished but the backend is still missing".to_string(),
            ));
        }
        Ok(info)
    }
}
