//! Available subcommands.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Look for an installed backend executable
    Detect,

    /// Show the locations searched for the backend, in order
    Paths,

    /// Query the backend status endpoint once
    Probe {
        /// Request timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Print the parsed status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bring the backend to a usable state, starting it if needed
    Setup {
        /// Keep an owned backend running until interrupted
        #[arg(long)]
        watch: bool,
        /// Program to run when the backend is not installed
        #[arg(long, value_name = "PROGRAM")]
        installer: Option<PathBuf>,
        /// Arguments passed to the installer program
        #[arg(long = "installer-arg", value_name = "ARG", requires = "installer")]
        installer_args: Vec<String>,
        /// Print events as JSON lines instead of a progress display
        #[arg(long)]
        json: bool,
    },

    /// Ask a running backend to load its model and follow progress
    Load,
}
