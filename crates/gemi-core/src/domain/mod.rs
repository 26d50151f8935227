//! Value types produced and consumed by the setup lifecycle.
//!
//! Every type here is immutable once created: probes and samples are
//! replaced, never updated in place.

mod health;
mod installation;
mod process;
mod progress;

pub use health::HealthStatus;
pub use installation::InstallationInfo;
pub use process::{Ownership, ProcessHandle};
pub use progress::{ESTIMATE_CEILING, ProgressSample};
