//! Result of a single backend status probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the backend's self-reported status.
///
/// Produced fresh by every successful probe. A probe that could not reach
/// the backend yields a `ProbeError` instead, so `healthy = false` here
/// means "reachable but refusing work".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// The backend answered and considers itself able to serve requests.
    pub healthy: bool,
    /// The model is resident in memory.
    pub model_loaded: bool,
    /// When the probe completed.
    pub checked_at: DateTime<Utc>,
    /// Load progress as reported by the backend, when it exposes one.
    ///
    /// A negative value is the backend's way of saying the load failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_progress: Option<f64>,
}

impl HealthStatus {
    /// Create a status stamped with the current time.
    pub fn new(healthy: bool, model_loaded: bool) -> Self {
        Self {
            healthy,
            model_loaded,
            checked_at: Utc::now(),
            reported_progress: None,
        }
    }

    /// Healthy backend with the model resident.
    pub fn ready() -> Self {
        Self::new(true, true)
    }

    /// Healthy backend that has not finished loading its model.
    pub fn loading() -> Self {
        Self::new(true, false)
    }

    /// Attach the backend's own progress figure.
    #[must_use]
    pub const fn with_reported_progress(mut self, progress: f64) -> Self {
        self.reported_progress = Some(progress);
        self
    }

    /// Whether the backend can serve inference requests right now.
    pub const fn is_ready(&self) -> bool {
        self.healthy && self.model_loaded
    }

    /// Whether the backend has told us the model load failed.
    pub fn reports_load_failure(&self) -> bool {
        self.reported_progress.is_some_and(|p| p < 0.0)
    }
}
