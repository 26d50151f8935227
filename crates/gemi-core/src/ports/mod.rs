//! Port definitions (trait abstractions) for the orchestrator's collaborators.
//!
//! Ports define the interfaces the setup lifecycle expects from
//! infrastructure. They use only domain types; filesystem, HTTP and process
//! details stay in the adapters.
//!
//! # Design Rules
//!
//! - Every fallible operation returns a typed error from this module
//! - Ports never retry; budgets and retryability belong to the orchestrator
//! - All traits are `Send + Sync` so they can be shared behind `Arc<dyn _>`

pub mod health_client;
pub mod installation_probe;
pub mod installer;
pub mod model_loader;
pub mod process_supervisor;

pub use health_client::{HealthClient, ProbeError};
pub use installation_probe::InstallationProbe;
pub use installer::{InstallError, Installer, NoopInstaller};
pub use model_loader::{LoadError, ModelLoadTrigger};
pub use process_supervisor::{LaunchError, ProcessSupervisor};
