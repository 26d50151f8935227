//! HTTP model-load trigger and progress estimation.
//!
//! Loading is observed through the status endpoint: the backend's own
//! `download_progress` is used when present, otherwise progress is
//! synthesized. Either way the sequence is monotone within one attempt and
//! stays below [`ESTIMATE_CEILING`] until `model_loaded` is reported.

use async_trait::async_trait;
use gemi_core::domain::ESTIMATE_CEILING;
use gemi_core::{
    BackendSettings, HealthClient, HealthStatus, LoadError, ModelLoadTrigger, ProgressSample,
};
use reqwest::{Client, StatusCode};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for the load request itself; the load runs in the background.
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns status probes into a monotone progress sequence.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    step: f64,
    last: f64,
}

impl ProgressEstimator {
    pub const fn new(step: f64) -> Self {
        Self { step, last: 0.0 }
    }

    /// Start a new attempt at zero.
    pub const fn reset(&mut self) {
        self.last = 0.0;
    }

    pub const fn current(&self) -> f64 {
        self.last
    }

    /// Next sample given a fresh status.
    pub fn observe(&mut self, status: &HealthStatus) -> ProgressSample {
        if status.model_loaded {
            self.last = 1.0;
            return ProgressSample::complete();
        }

        let (raw, estimated) = match status.reported_progress.filter(|p| *p >= 0.0) {
            Some(reported) => (reported, false),
            None => (self.last + self.step, true),
        };
        self.last = raw.min(ESTIMATE_CEILING).max(self.last);

        let message = if estimated {
            "Loading model (estimated)"
        } else {
            "Loading model"
        };
        ProgressSample::new(self.last, message, estimated)
    }
}

/// [`ModelLoadTrigger`] talking to the backend over HTTP.
pub struct HttpModelLoader {
    client: Client,
    url: String,
    health: Arc<dyn HealthClient>,
    estimator: Mutex<ProgressEstimator>,
}

impl HttpModelLoader {
    pub fn new(settings: &BackendSettings, health: Arc<dyn HealthClient>) -> Self {
        Self::with_client(
            Client::new(),
            settings.load_model_url(),
            settings.estimate_step,
            health,
        )
    }

    pub fn with_client(
        client: Client,
        url: impl Into<String>,
        estimate_step: f64,
        health: Arc<dyn HealthClient>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            health,
            estimator: Mutex::new(ProgressEstimator::new(estimate_step)),
        }
    }

    fn estimator(&self) -> std::sync::MutexGuard<'_, ProgressEstimator> {
        self.estimator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ModelLoadTrigger for HttpModelLoader {
    async fn start(&self) -> Result<(), LoadError> {
        self.estimator().reset();

        let response = self
            .client
            .post(&self.url)
            .timeout(TRIGGER_TIMEOUT)
            .send()
            .await
            .map_err(|e| LoadError::Unreachable(e.to_string()))?;

        let status = response.status();
        match status {
            s if s.is_success() => {
                info!(url = %self.url, "Model load requested");
                Ok(())
            }
            // Backends that load on startup have no trigger endpoint
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
                debug!(url = %self.url, %status, "No load endpoint; backend loads on its own");
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("Model load already in progress");
                Ok(())
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                warn!(url = %self.url, %status, "Model load request rejected: {}", body);
                Err(LoadError::Rejected(format!("HTTP {status}: {}", body.trim())))
            }
        }
    }

    async fn poll_progress(&self, timeout: Duration) -> Result<ProgressSample, LoadError> {
        let status = self
            .health
            .probe(timeout)
            .await
            .map_err(|e| LoadError::Unreachable(e.to_string()))?;

        if status.reports_load_failure() {
            return Err(LoadError::Failed(
                "backend reported that the model failed to load".to_string(),
            ));
        }
        if !status.healthy {
            return Err(LoadError::Unreachable(
                "backend reports itself unhealthy".to_string(),
            ));
        }

        Ok(self.estimator().observe(&status))
    }
}
