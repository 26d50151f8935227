//! Detect command handler.

use gemi_core::InstallationProbe;
use tracing::debug;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Report where the backend is installed.
///
/// Missing is reported as an error so scripts can branch on the exit code.
pub fn execute(ctx: &CliContext) -> Result<(), CliError> {
    let info = ctx.probe.detect();
    debug!(?info, "Installation probe finished");

    match info.executable() {
        Some(path) => {
            println!("Backend found: {}", path.display());
            if let Some(version) = &info.version {
                println!("Version: {version}");
            }
            Ok(())
        }
        None => {
            println!("Backend not found. Searched:");
            for path in ctx.probe.candidates() {
                println!("  {}", path.display());
            }
            Err(CliError::NotInstalled)
        }
    }
}
