//! Backend subprocess management.
//!
//! - `supervisor`: the [`ProcessSupervisor`](gemi_core::ProcessSupervisor) adapter
//! - `shutdown`: SIGTERM → SIGKILL termination with reaping
//! - `logs`: child output forwarding into `tracing`

mod logs;
mod shutdown;
mod supervisor;

pub use logs::{BACKEND_LOG_TARGET, LogTail, spawn_log_readers};
pub use shutdown::{DEFAULT_GRACE_PERIOD, shutdown_child};
pub use supervisor::LocalProcessSupervisor;
