//! CLI error type and exit codes.

use gemi_core::{FailureKind, LoadError, ProbeError, SettingsError, SetupState};
use gemi_runtime::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Backend is not installed")]
    NotInstalled,

    #[error("Backend status check failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Model load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Setup failed ({kind}): {message}")]
    Setup { kind: FailureKind, message: String },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl CliError {
    /// Error for a settled state, or `None` when it is `Ready`.
    pub fn from_state(state: &SetupState) -> Option<Self> {
        match state {
            SetupState::Failed { kind, message, .. } => Some(Self::Setup {
                kind: *kind,
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Process exit code, following sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Settings(_) => 78, // EX_CONFIG
            Self::NotInstalled
            | Self::Probe(ProbeError::Unreachable(_))
            | Self::Setup {
                kind: FailureKind::NotInstalled,
                ..
            } => 69, // EX_UNAVAILABLE
            Self::Probe(ProbeError::Malformed(_)) => 76, // EX_PROTOCOL
            Self::Setup {
                kind: FailureKind::Cancelled,
                ..
            } => 130,
            Self::Orchestrator(_) => 70, // EX_SOFTWARE
            Self::Load(_) | Self::Setup { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_is_not_an_error() {
        assert!(CliError::from_state(&SetupState::Ready).is_none());
    }

    #[test]
    fn failures_map_to_distinct_exit_codes() {
        let missing = CliError::from_state(&SetupState::failed(FailureKind::NotInstalled, "x"));
        let cancelled = CliError::from_state(&SetupState::failed(FailureKind::Cancelled, "x"));
        let timeout = CliError::from_state(&SetupState::failed(FailureKind::Timeout, "x"));

        assert_eq!(missing.unwrap().exit_code(), 69);
        assert_eq!(cancelled.unwrap().exit_code(), 130);
        assert_eq!(timeout.unwrap().exit_code(), 1);
        assert_eq!(CliError::Settings(SettingsError::InvalidPort).exit_code(), 78);
        assert_eq!(
            CliError::Probe(ProbeError::Malformed("bad".into())).exit_code(),
            76
        );
    }
}
