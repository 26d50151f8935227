//! Model load trigger port.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ProgressSample;

/// Errors from triggering or tracking a model load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The backend could not be reached.
    #[error("backend unreachable during model load: {0}")]
    Unreachable(String),

    /// The backend refused the load request.
    #[error("model load rejected: {0}")]
    Rejected(String),

    /// The backend reported that the load failed.
    #[error("model load failed: {0}")]
    Failed(String),
}

impl LoadError {
    /// Whether polling may continue after this error.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Triggers loading of the model and reports progress.
#[async_trait]
pub trait ModelLoadTrigger: Send + Sync {
    /// Ask the backend to load its model. Fire-and-forget: completion is
    /// observed through [`poll_progress`](Self::poll_progress).
    ///
    /// Also starts a new load attempt, so progress begins again at zero.
    async fn start(&self) -> Result<(), LoadError>;

    /// Sample load progress.
    ///
    /// Within one attempt the returned fraction never decreases. Without a
    /// real signal from the backend the sample is an estimate capped below
    /// 1.0; it reaches 1.0 only once the backend reports the model loaded.
    async fn poll_progress(&self, timeout: Duration) -> Result<ProgressSample, LoadError>;
}
