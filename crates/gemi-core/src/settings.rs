//! Backend settings.
//!
//! Everything the orchestrator and its adapters need to know about where the
//! backend lives and how patiently to wait for it. Defaults match the stock
//! backend; `from_env` overlays `GEMI_BACKEND_*` variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ESTIMATE_CEILING;
use crate::retry::{RetryPolicy, millis};

/// Default host the backend binds to.
pub const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";

/// Default port the backend listens on.
pub const DEFAULT_BACKEND_PORT: u16 = 11435;

/// Default status endpoint path.
pub const DEFAULT_STATUS_PATH: &str = "/status";

/// Default load-model endpoint path.
pub const DEFAULT_LOAD_MODEL_PATH: &str = "/load-model";

/// Explicit backend executable, highest precedence for detection.
pub const ENV_BACKEND_PATH: &str = "GEMI_BACKEND_PATH";
pub const ENV_BACKEND_HOST: &str = "GEMI_BACKEND_HOST";
pub const ENV_BACKEND_PORT: &str = "GEMI_BACKEND_PORT";
pub const ENV_PROBE_TIMEOUT_MS: &str = "GEMI_BACKEND_PROBE_TIMEOUT_MS";
pub const ENV_LOAD_TIMEOUT_SECS: &str = "GEMI_BACKEND_LOAD_TIMEOUT_SECS";

/// Errors from loading or validating settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Backend host cannot be empty")]
    EmptyHost,

    #[error("Backend port must be non-zero")]
    InvalidPort,

    #[error("Endpoint path must start with '/', got {0:?}")]
    InvalidEndpointPath(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Invalid {name} retry policy: {reason}")]
    InvalidPolicy { name: &'static str, reason: String },

    #[error("Progress estimate step must be in (0, {ceiling}], got {step}")]
    InvalidEstimateStep { step: String, ceiling: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Configuration for locating, launching and probing the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendSettings {
    /// Host the backend listens on; also passed to the child.
    pub host: String,
    /// Port the backend listens on; also passed to the child.
    pub port: u16,
    /// Status endpoint path.
    pub status_path: String,
    /// Load-model endpoint path.
    pub load_model_path: String,
    /// Arguments that select serve mode.
    pub serve_args: Vec<String>,
    /// Timeout for one status request.
    #[serde(with = "millis")]
    pub probe_timeout: Duration,
    /// Polling budget while waiting for the backend to answer.
    pub health_policy: RetryPolicy,
    /// Budget for spawning the process.
    pub launch_policy: RetryPolicy,
    /// Automatic re-runs of the whole lifecycle after a retryable failure.
    pub setup_policy: RetryPolicy,
    /// Launches allowed within one attempt (initial start plus restarts).
    pub max_launches: u32,
    /// Interval between progress polls while loading.
    #[serde(with = "millis")]
    pub progress_interval: Duration,
    /// Give up on a model load after this long.
    #[serde(with = "millis")]
    pub model_load_timeout: Duration,
    /// Consecutive unreachable progress polls tolerated during a load.
    pub load_unreachable_limit: u32,
    /// Increment of the synthetic progress estimate per poll.
    pub estimate_step: f64,
    /// Explicit backend executable; checked before any other location.
    pub binary_path: Option<PathBuf>,
    /// Extra locations to check after the explicit path.
    pub extra_candidates: Vec<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_BACKEND_HOST.to_string(),
            port: DEFAULT_BACKEND_PORT,
            status_path: DEFAULT_STATUS_PATH.to_string(),
            load_model_path: DEFAULT_LOAD_MODEL_PATH.to_string(),
            serve_args: vec!["serve".to_string()],
            probe_timeout: Duration::from_secs(3),
            health_policy: RetryPolicy::new(
                20,
                Duration::from_millis(250),
                1.5,
                Duration::from_secs(2),
            ),
            launch_policy: RetryPolicy::new(
                3,
                Duration::from_millis(500),
                2.0,
                Duration::from_secs(4),
            ),
            setup_policy: RetryPolicy::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(10)),
            max_launches: 2,
            progress_interval: Duration::from_millis(500),
            model_load_timeout: Duration::from_secs(15 * 60),
            load_unreachable_limit: 10,
            estimate_step: 0.02,
            binary_path: None,
            extra_candidates: Vec::new(),
        }
    }
}

impl BackendSettings {
    /// Defaults overlaid with `GEMI_BACKEND_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (an environment-like key/value source).
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BACKEND_HOST) {
            self.host = host.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_BACKEND_PORT) {
            self.port = parse_env(ENV_BACKEND_PORT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PROBE_TIMEOUT_MS) {
            self.probe_timeout = Duration::from_millis(parse_env(ENV_PROBE_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_LOAD_TIMEOUT_SECS) {
            self.model_load_timeout = Duration::from_secs(parse_env(ENV_LOAD_TIMEOUT_SECS, &raw)?);
        }
        if let Some(path) = lookup(ENV_BACKEND_PATH).filter(|p| !p.trim().is_empty()) {
            self.binary_path = Some(PathBuf::from(path.trim()));
        }
        Ok(self)
    }

    /// Base URL of the backend, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL of the status endpoint.
    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url(), self.status_path)
    }

    /// Full URL of the load-model endpoint.
    pub fn load_model_url(&self) -> String {
        format!("{}{}", self.base_url(), self.load_model_path)
    }

    /// Reject inconsistent values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::EmptyHost);
        }
        if self.port == 0 {
            return Err(SettingsError::InvalidPort);
        }

        for path in [&self.status_path, &self.load_model_path] {
            if !path.starts_with('/') {
                return Err(SettingsError::InvalidEndpointPath(path.clone()));
            }
        }

        if self.probe_timeout.is_zero() {
            return Err(SettingsError::ZeroDuration("probe_timeout"));
        }
        if self.progress_interval.is_zero() {
            return Err(SettingsError::ZeroDuration("progress_interval"));
        }
        if self.model_load_timeout.is_zero() {
            return Err(SettingsError::ZeroDuration("model_load_timeout"));
        }

        for (name, policy) in [
            ("health", &self.health_policy),
            ("launch", &self.launch_policy),
            ("setup", &self.setup_policy),
        ] {
            policy
                .validate()
                .map_err(|reason| SettingsError::InvalidPolicy { name, reason })?;
        }

        if self.max_launches == 0 {
            return Err(SettingsError::InvalidPolicy {
                name: "launch",
                reason: "max_launches must be at least 1".to_string(),
            });
        }

        if !(self.estimate_step > 0.0 && self.estimate_step <= ESTIMATE_CEILING) {
            return Err(SettingsError::InvalidEstimateStep {
                step: self.estimate_step.to_string(),
                ceiling: ESTIMATE_CEILING.to_string(),
            });
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}
