//! Runtime adapters and orchestration for the Gemi inference backend.
//!
//! Implements the ports declared in `gemi-core` against the real world
//! (filesystem, HTTP, child processes) and hosts the [`SetupOrchestrator`]
//! that sequences them.
#![deny(unsafe_code)]

pub mod events;
pub mod health;
pub mod install;
pub mod model_load;
pub mod orchestrator;
pub mod process;
pub mod retry;

// Re-export the adapters the composition root wires together
pub use events::{EventSink, Subscription, SubscriptionId};
pub use health::{HttpHealthClient, parse_status_body};
pub use install::{CommandInstaller, FsInstallationProbe};
pub use model_load::{HttpModelLoader, ProgressEstimator};
pub use orchestrator::{Collaborators, OrchestratorError, SetupOrchestrator};
pub use process::LocalProcessSupervisor;
pub use retry::retry;
