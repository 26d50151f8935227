//! Health client port.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::HealthStatus;

/// Why a status probe produced no [`HealthStatus`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Connection refused, timed out, or the server errored.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with something we could not understand.
    #[error("malformed status response: {0}")]
    Malformed(String),
}

impl ProbeError {
    /// Both variants mean "not healthy yet" to a polling loop.
    pub const fn is_retryable(&self) -> bool {
        true
    }

    /// Whether this points at a protocol mismatch rather than a down backend.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Issues one status request against the backend.
///
/// No internal retries: each call is a single bounded request.
#[async_trait]
pub trait HealthClient: Send + Sync {
    async fn probe(&self, timeout: Duration) -> Result<HealthStatus, ProbeError>;
}
