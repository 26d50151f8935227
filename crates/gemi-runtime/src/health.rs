//! HTTP health client for the backend's status endpoint.
//!
//! One request per probe, no retries. Response parsing is tolerant of the
//! two shapes backends have shipped with:
//!
//! - `{ "healthy": true, "model_loaded": false }`
//! - `{ "status": "loading", "model_loaded": false, "download_progress": 0.3 }`

use async_trait::async_trait;
use gemi_core::{BackendSettings, HealthClient, HealthStatus, ProbeError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// [`HealthClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpHealthClient {
    client: Client,
    url: String,
}

impl HttpHealthClient {
    /// Client for the status endpoint described by `settings`.
    pub fn new(settings: &BackendSettings) -> Self {
        Self::with_client(Client::new(), settings.status_url())
    }

    /// Client probing `url` through an existing connection pool.
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthClient for HttpHealthClient {
    async fn probe(&self, timeout: Duration) -> Result<HealthStatus, ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                debug!(url = %self.url, "Health probe failed: {}", e);
                ProbeError::Unreachable(describe_transport_error(&e))
            })?;

        let status = response.status();
        if status.is_server_error() {
            debug!(url = %self.url, %status, "Backend answered with a server error");
            return Err(ProbeError::Unreachable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            warn!(url = %self.url, %status, "Status endpoint returned an unexpected code");
            return Err(ProbeError::Malformed(format!("unexpected HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Unreachable(describe_transport_error(&e)))?;

        parse_status_body(&body).inspect_err(|e| {
            warn!(url = %self.url, body = %truncate(&body, 200), "{}", e);
        })
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    healthy: Option<bool>,
    status: Option<String>,
    #[serde(alias = "modelLoaded")]
    model_loaded: Option<bool>,
    model: Option<String>,
    #[serde(alias = "progress")]
    download_progress: Option<f64>,
}

/// Parse a status response into a [`HealthStatus`].
pub fn parse_status_body(body: &str) -> Result<HealthStatus, ProbeError> {
    let parsed: StatusBody = serde_json::from_str(body)
        .map_err(|e| ProbeError::Malformed(format!("invalid JSON: {e}")))?;

    let status_word = parsed.status.as_deref().map(str::to_ascii_lowercase);

    let healthy = match (parsed.healthy, status_word.as_deref()) {
        (Some(flag), _) => flag,
        (None, Some("healthy" | "ok" | "ready" | "loading" | "running" | "starting")) => true,
        (None, Some("unhealthy" | "error" | "failed")) => false,
        (None, Some(other)) => {
            return Err(ProbeError::Malformed(format!("unknown status {other:?}")));
        }
        (None, None) => {
            return Err(ProbeError::Malformed(
                "response has neither `healthy` nor `status`".to_string(),
            ));
        }
    };

    let model_loaded = match (parsed.model_loaded, parsed.model.as_deref()) {
        (Some(flag), _) => flag,
        (None, Some(model)) => model.eq_ignore_ascii_case("loaded"),
        (None, None) => match status_word.as_deref() {
            Some("ready") => true,
            Some("loading" | "starting") => false,
            _ => {
                return Err(ProbeError::Malformed(
                    "response does not say whether the model is loaded".to_string(),
                ));
            }
        },
    };

    let mut status = HealthStatus::new(healthy, model_loaded);
    if let Some(progress) = parsed.download_progress.filter(|p| p.is_finite()) {
        status = status.with_reported_progress(progress);
    }
    Ok(status)
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        "connection refused".to_string()
    } else {
        e.to_string()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_shape() {
        let status = parse_status_body(r#"{"healthy": true, "model_loaded": false}"#).unwrap();
        assert!(status.healthy);
        assert!(!status.model_loaded);
        assert!(status.reported_progress.is_none());
    }

    #[test]
    fn parses_status_word_with_progress() {
        let status = parse_status_body(
            r#"{"status": "loading", "model_loaded": false, "device": "mps", "download_progress": 0.3}"#,
        )
        .unwrap();
        assert!(status.healthy);
        assert!(!status.model_loaded);
        assert_eq!(status.reported_progress, Some(0.3));
    }

    #[test]
    fn parses_lazy_model_field() {
        let status = parse_status_body(r#"{"status": "healthy", "model": "loaded"}"#).unwrap();
        assert!(status.is_ready());
        let status = parse_status_body(r#"{"status": "healthy", "model": "not_loaded"}"#).unwrap();
        assert!(!status.model_loaded);
    }

    #[test]
    fn negative_progress_is_kept() {
        let status =
            parse_status_body(r#"{"status": "loading", "model_loaded": false, "download_progress": -1.0}"#)
                .unwrap();
        assert!(status.reports_load_failure());
    }

    #[test]
    fn rejects_unrecognised_shapes() {
        assert!(parse_status_body("not json").unwrap_err().is_malformed());
        assert!(parse_status_body(r#"{"model_loaded": true}"#).unwrap_err().is_malformed());
        assert!(parse_status_body(r#"{"status": "sleeping", "model_loaded": true}"#)
            .unwrap_err()
            .is_malformed());
        assert!(parse_status_body(r#"{"healthy": true}"#).unwrap_err().is_malformed());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
