//! Backend installation: detection on disk and the external install action.

mod command;
mod detect;

pub use command::CommandInstaller;
pub use detect::{BinaryError, FsInstallationProbe, read_version, validate_binary};
