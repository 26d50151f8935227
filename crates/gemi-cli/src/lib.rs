//! Operator CLI for the Gemi inference backend.
//!
//! Exposes the same collaborators the desktop app wires together, so the
//! backend lifecycle can be exercised from a terminal.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used only by the binary in main.rs
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod progress;

// Re-export primary types for convenient access
pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
