//! Root CLI structure and global options.

use std::path::PathBuf;

use clap::Parser;
use gemi_core::BackendSettings;

use crate::commands::Commands;
use crate::error::CliError;

/// Locate, start and check the local Gemi inference backend.
#[derive(Parser)]
#[command(name = "gemi-backend")]
#[command(about = "Locate, start and check the local Gemi inference backend")]
#[command(version)]
pub struct Cli {
    /// Host the backend listens on
    #[arg(long, env = "GEMI_BACKEND_HOST", global = true)]
    pub host: Option<String>,

    /// Port the backend listens on
    #[arg(long, env = "GEMI_BACKEND_PORT", global = true)]
    pub port: Option<u16>,

    /// Backend executable to use instead of searching for one
    #[arg(long = "binary", env = "GEMI_BACKEND_PATH", global = true)]
    pub binary: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Settings from the environment, with command-line flags taking precedence.
    pub fn settings(&self) -> Result<BackendSettings, CliError> {
        let mut settings = BackendSettings::from_env()?;
        if let Some(host) = &self.host {
            settings.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(binary) = &self.binary {
            settings.binary_path = Some(binary.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "gemi-backend",
            "probe",
            "--port",
            "12000",
            "--binary",
            "/opt/gemi/gemi-server",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.port, Some(12000));
        assert_eq!(cli.binary, Some(PathBuf::from("/opt/gemi/gemi-server")));
        assert!(matches!(cli.command, Some(Commands::Probe { .. })));
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from(["gemi-backend", "--host", "localhost", "--port", "9999", "detect"]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 9999);
    }

    #[test]
    fn zero_port_is_rejected() {
        let cli = Cli::parse_from(["gemi-backend", "--port", "0", "detect"]);
        assert!(matches!(cli.settings(), Err(CliError::Settings(_))));
    }
}
