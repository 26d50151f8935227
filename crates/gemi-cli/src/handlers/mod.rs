//! Command handlers.
//!
//! Each handler receives the composed [`CliContext`](crate::CliContext).

pub mod detect;
pub mod load;
pub mod paths;
pub mod probe;
pub mod setup;
