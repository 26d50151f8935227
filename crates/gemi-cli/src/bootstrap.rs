//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters are instantiated:
//! - Installation probe over the filesystem
//! - HTTP health client and model-load trigger
//! - Local process supervisor
//! - Installer (external command, or none)
//!
//! Handlers receive the composed [`CliContext`] and never build adapters.

use std::path::PathBuf;
use std::sync::Arc;

use gemi_core::{BackendSettings, HealthClient, InstallationProbe, Installer, NoopInstaller};
use gemi_runtime::{
    Collaborators, CommandInstaller, FsInstallationProbe, HttpHealthClient, HttpModelLoader,
    LocalProcessSupervisor, SetupOrchestrator,
};

use crate::error::CliError;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub settings: BackendSettings,
    /// Installer program offered when the backend is missing.
    pub installer: Option<PathBuf>,
    pub installer_args: Vec<String>,
}

/// Fully composed adapters for CLI commands.
pub struct CliContext {
    pub settings: BackendSettings,
    pub probe: Arc<FsInstallationProbe>,
    pub health: Arc<HttpHealthClient>,
    pub supervisor: Arc<LocalProcessSupervisor>,
    pub loader: Arc<HttpModelLoader>,
    pub installer: Arc<dyn Installer>,
    /// Whether `installer` runs a real program.
    pub can_install: bool,
}

impl CliContext {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            probe: self.probe.clone(),
            health: self.health.clone(),
            supervisor: self.supervisor.clone(),
            loader: self.loader.clone(),
            installer: Arc::clone(&self.installer),
        }
    }

    /// Spawn an orchestrator over this context's adapters.
    pub fn start_orchestrator(&self) -> Result<SetupOrchestrator, CliError> {
        Ok(SetupOrchestrator::start(
            self.settings.clone(),
            self.collaborators(),
        )?)
    }
}

/// Compose all adapters from `config`.
pub fn bootstrap(config: CliConfig) -> CliContext {
    let settings = config.settings;

    let probe = Arc::new(FsInstallationProbe::new(&settings));
    let health = Arc::new(HttpHealthClient::new(&settings));
    let shared_health: Arc<dyn HealthClient> = health.clone();
    let supervisor = Arc::new(LocalProcessSupervisor::new(
        &settings,
        Arc::clone(&shared_health),
    ));
    let loader = Arc::new(HttpModelLoader::new(&settings, shared_health));

    let can_install = config.installer.is_some();
    let installer: Arc<dyn Installer> = match config.installer {
        Some(program) => {
            let detector: Arc<dyn InstallationProbe> = probe.clone();
            Arc::new(CommandInstaller::new(program, detector).with_args(config.installer_args))
        }
        None => Arc::new(NoopInstaller),
    };

    CliContext {
        settings,
        probe,
        health,
        supervisor,
        loader,
        installer,
        can_install,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemi_core::ProbeError;
    use std::time::Duration;

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn installer_is_optional() {
        let ctx = bootstrap(CliConfig::default());
        assert!(!ctx.can_install);

        let ctx = bootstrap(CliConfig {
            installer: Some(PathBuf::from("/usr/local/bin/install-gemi")),
            ..CliConfig::default()
        });
        assert!(ctx.can_install);
    }

    #[test]
    fn adapters_share_the_configured_endpoint() {
        let settings = BackendSettings {
            port: 12345,
            ..BackendSettings::default()
        };
        let ctx = bootstrap(CliConfig {
            settings,
            ..CliConfig::default()
        });
        assert_eq!(ctx.health.url(), "http://127.0.0.1:12345/status");
    }

    #[tokio::test]
    async fn orchestrator_refuses_settings_that_skipped_validation() {
        let settings = BackendSettings {
            progress_interval: Duration::ZERO,
            ..BackendSettings::default()
        };
        let ctx = bootstrap(CliConfig {
            settings,
            ..CliConfig::default()
        });

        let err = ctx.start_orchestrator().err().unwrap();
        assert!(matches!(err, CliError::Settings(_)));
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn probe_against_a_closed_port_is_unavailable() {
        let settings = BackendSettings {
            port: unused_port(),
            ..BackendSettings::default()
        };
        let ctx = bootstrap(CliConfig {
            settings,
            ..CliConfig::default()
        });

        let err = tokio_test::block_on(crate::handlers::probe::execute(&ctx, Some(500), false))
            .unwrap_err();
        assert!(matches!(err, CliError::Probe(ProbeError::Unreachable(_))));
        assert_eq!(err.exit_code(), 69);
    }
}
