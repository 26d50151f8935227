//! Core domain types and port definitions for the Gemi inference backend.
//!
//! This crate describes *what* the setup lifecycle looks like (states,
//! events, errors, settings) and *which* collaborators it needs (ports).
//! It contains no I/O: adapters live in `gemi-runtime`.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod retry;
pub mod settings;
pub mod state;

// Re-export commonly used types for convenience
pub use domain::{HealthStatus, InstallationInfo, Ownership, ProcessHandle, ProgressSample};
pub use events::{SetupEvent, StateTransition};
pub use paths::{BACKEND_BINARY_NAME, candidate_paths};
pub use ports::{
    HealthClient, InstallError, Installer, InstallationProbe, LaunchError, LoadError,
    ModelLoadTrigger, NoopInstaller, ProbeError, ProcessSupervisor,
};
pub use retry::{Exhausted, RetryBudget, RetryPolicy};
pub use settings::{
    BackendSettings, DEFAULT_BACKEND_HOST, DEFAULT_BACKEND_PORT, SettingsError,
};
pub use state::{FailureKind, SetupPhase, SetupState};
