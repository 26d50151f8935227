//! Load command handler.
//!
//! Talks to the model-load trigger directly, without the orchestrator: the
//! backend is expected to be running already.

use gemi_core::{FailureKind, LoadError, ModelLoadTrigger, SetupState, StateTransition};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::progress::{BarReporter, SetupReporter};

/// Trigger a model load and follow it to completion.
pub async fn execute(ctx: &CliContext) -> Result<(), CliError> {
    let settings = &ctx.settings;
    let reporter = BarReporter::new();

    ctx.loader.start().await?;
    reporter.transition(&StateTransition::new(
        SetupState::WaitingForHealth,
        SetupState::LoadingModel { progress: 0.0 },
    ));

    let deadline = Instant::now() + settings.model_load_timeout;
    let mut ticker = interval(settings.progress_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut unreachable = 0;

    let failure = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                let message = "model load interrupted";
                reporter.finish(&SetupState::failed(FailureKind::Cancelled, message));
                return Err(CliError::Setup {
                    kind: FailureKind::Cancelled,
                    message: message.to_string(),
                });
            }
            _ = ticker.tick() => {}
        }

        if Instant::now() >= deadline {
            break LoadError::Failed(format!(
                "model did not finish loading within {}s",
                settings.model_load_timeout.as_secs()
            ));
        }

        match ctx.loader.poll_progress(settings.probe_timeout).await {
            Ok(sample) => {
                unreachable = 0;
                reporter.progress(&sample);
                if sample.is_complete() {
                    reporter.finish(&SetupState::Ready);
                    return Ok(());
                }
            }
            Err(e) if e.is_transient() && unreachable + 1 < settings.load_unreachable_limit => {
                unreachable += 1;
                debug!(unreachable, "Progress poll failed: {}", e);
            }
            Err(e) => break e,
        }
    };

    reporter.finish(&SetupState::failed(FailureKind::ModelLoadFailed, failure.to_string()));
    Err(failure.into())
}
