//! Probe command handler.

use std::time::Duration;

use gemi_core::HealthClient;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Query the status endpoint once and print what it says.
pub async fn execute(ctx: &CliContext, timeout_ms: Option<u64>, json: bool) -> Result<(), CliError> {
    let timeout = timeout_ms.map_or(ctx.settings.probe_timeout, Duration::from_millis);
    let status = ctx.health.probe(timeout).await?;

    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!("Could not serialize status: {}", e),
        }
        return Ok(());
    }

    println!("Endpoint:     {}", ctx.health.url());
    println!("Healthy:      {}", status.healthy);
    println!("Model loaded: {}", status.model_loaded);
    if let Some(progress) = status.reported_progress {
        if progress < 0.0 {
            println!("Progress:     model failed to load");
        } else {
            println!("Progress:     {:.0}%", progress * 100.0);
        }
    }
    Ok(())
}
