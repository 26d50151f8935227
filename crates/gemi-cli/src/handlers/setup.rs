//! Setup command handler.
//!
//! Drives a [`SetupOrchestrator`] and renders its events. Ctrl+C cancels
//! the attempt in flight; the orchestrator is always shut down before
//! returning, which terminates a backend this process started.

use std::future::Future;

use gemi_core::{FailureKind, SetupState};
use gemi_runtime::{OrchestratorError, SetupOrchestrator, Subscription};
use tracing::{debug, info};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::progress::{BarReporter, JsonReporter, SetupReporter};

/// Options for the setup command.
#[derive(Debug, Clone, Default)]
pub struct SetupArgs {
    /// Keep running after `Ready` until interrupted.
    pub watch: bool,
    /// JSON lines instead of a progress display.
    pub json: bool,
}

/// Execute the setup command.
pub async fn execute(ctx: &CliContext, args: &SetupArgs) -> Result<(), CliError> {
    let reporter: Box<dyn SetupReporter> = if args.json {
        Box::new(JsonReporter)
    } else {
        Box::new(BarReporter::new())
    };

    let orchestrator = ctx.start_orchestrator()?;
    let mut events = orchestrator.subscribe();

    let result = drive(ctx, &orchestrator, &mut events, reporter.as_ref(), args).await;

    if let Err(e) = orchestrator.shutdown().await {
        debug!("Orchestrator already stopped: {}", e);
    }
    result
}

async fn drive(
    ctx: &CliContext,
    orchestrator: &SetupOrchestrator,
    events: &mut Subscription,
    reporter: &dyn SetupReporter,
    args: &SetupArgs,
) -> Result<(), CliError> {
    let mut state = follow(orchestrator, events, reporter, orchestrator.run()).await?;

    if state.failure_kind() == Some(FailureKind::NotInstalled) && ctx.can_install {
        info!("Backend missing; running the installer");
        state = follow(orchestrator, events, reporter, orchestrator.install()).await?;
    }

    reporter.finish(&state);
    if let Some(error) = CliError::from_state(&state) {
        if state.failure_kind() == Some(FailureKind::NotInstalled) && !args.json {
            eprintln!("Hint: pass --installer <PROGRAM> or --binary <PATH>");
        }
        return Err(error);
    }

    if args.watch {
        println!(
            "Backend ready at {}. Press Ctrl+C to stop.",
            ctx.settings.base_url()
        );
        wait_for_interrupt(events, reporter).await;
    }
    Ok(())
}

/// Await `request`, rendering events until it settles.
async fn follow<F>(
    orchestrator: &SetupOrchestrator,
    events: &mut Subscription,
    reporter: &dyn SetupReporter,
    request: F,
) -> Result<SetupState, CliError>
where
    F: Future<Output = Result<SetupState, OrchestratorError>>,
{
    let mut request = std::pin::pin!(request);
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;

    let state = loop {
        tokio::select! {
            result = &mut request => break result?,
            Some(event) = events.recv() => reporter.event(&event),
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                info!("Interrupted; cancelling setup");
                orchestrator.cancel().await?;
            }
        }
    };

    // Transitions published just before the request settled
    while let Some(event) = events.try_recv() {
        reporter.event(&event);
    }
    Ok(state)
}

async fn wait_for_interrupt(events: &mut Subscription, reporter: &dyn SetupReporter) {
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut ctrl_c => return,
            event = events.recv() => match event {
                Some(event) => reporter.event(&event),
                None => return,
            },
        }
    }
}
