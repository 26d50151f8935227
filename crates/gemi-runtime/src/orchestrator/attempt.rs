//! One setup attempt, from `Checking` (or `Installing`) to a settled state.
//!
//! The attempt never mutates state itself: every step is sent to the actor
//! as a [`Step`], and the settled state it ends in is sent last.

use gemi_core::{
    BackendSettings, FailureKind, HealthStatus, LaunchError, ProbeError, ProcessHandle,
    ProgressSample, SetupState,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Collaborators;
use crate::retry::retry;

/// Where an attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Start at `Checking`.
    Setup,
    /// Run the installer first, then continue at `Checking`.
    Install,
}

/// Progress report from an attempt to the actor.
#[derive(Debug)]
pub(super) enum Step {
    Enter(SetupState),
    Progress(ProgressSample),
}

#[derive(Debug)]
pub(super) struct StepMsg {
    pub attempt: u64,
    pub step: Step,
}

pub(super) struct Attempt {
    pub id: u64,
    pub settings: Arc<BackendSettings>,
    pub collab: Collaborators,
    pub steps: mpsc::UnboundedSender<StepMsg>,
    pub cancel: CancellationToken,
}

/// Why health polling stopped short of a healthy answer.
#[derive(Debug)]
enum PollError {
    /// The owned process exited.
    Died,
    /// Reachable, but reporting itself unhealthy.
    NotHealthy,
    Probe(ProbeError),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Died => f.write_str("backend process exited"),
            Self::NotHealthy => f.write_str("backend reports itself unhealthy"),
            Self::Probe(e) => e.fmt(f),
        }
    }
}

type Outcome<T> = Result<T, SetupState>;

impl Attempt {
    /// Drive the attempt until it settles or is cancelled.
    ///
    /// On cancellation nothing is reported; the actor has already moved on.
    pub async fn run(self, mode: Mode) {
        let settled = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                debug!(attempt = self.id, "Setup attempt cancelled");
                return;
            }
            outcome = self.drive(mode) => outcome.unwrap_or_else(|failed| failed),
        };
        self.enter(settled);
    }

    fn enter(&self, state: SetupState) {
        let _ = self.steps.send(StepMsg {
            attempt: self.id,
            step: Step::Enter(state),
        });
    }

    fn progress(&self, sample: ProgressSample) {
        let _ = self.steps.send(StepMsg {
            attempt: self.id,
            step: Step::Progress(sample),
        });
    }

    async fn drive(&self, mode: Mode) -> Outcome<SetupState> {
        if mode == Mode::Install {
            self.install().await?;
            self.enter(SetupState::Checking);
        }

        // A backend that already answers needs neither detection nor launch.
        let status = match self.probe_once().await {
            Some(status) => {
                info!("Backend already healthy; skipping launch");
                self.enter(SetupState::WaitingForHealth);
                status
            }
            None => {
                let binary = self.detect().await?;
                self.enter(SetupState::WaitingForHealth);
                self.launch_until_healthy(&binary).await?
            }
        };

        if status.model_loaded {
            return Ok(SetupState::Ready);
        }

        self.enter(SetupState::LoadingModel { progress: 0.0 });
        self.load_model().await
    }

    async fn install(&self) -> Outcome<()> {
        match self.collab.installer.perform_install().await {
            Ok(info) => {
                info!(path = ?info.path, version = ?info.version, "Backend installed");
                Ok(())
            }
            Err(e) => {
                warn!("Backend install failed: {}", e);
                Err(SetupState::failed(FailureKind::NotInstalled, e.to_string()))
            }
        }
    }

    async fn probe_once(&self) -> Option<HealthStatus> {
        match self.collab.health.probe(self.settings.probe_timeout).await {
            Ok(status) if status.healthy => Some(status),
            Ok(_) => None,
            Err(e) => {
                debug!("Initial probe: {}", e);
                None
            }
        }
    }

    async fn detect(&self) -> Outcome<PathBuf> {
        let probe = Arc::clone(&self.collab.probe);
        let info = tokio::task::spawn_blocking(move || probe.detect())
            .await
            .map_err(|e| {
                SetupState::failed(FailureKind::Unknown, format!("installation probe failed: {e}"))
            })?;

        match info.executable() {
            Some(path) => Ok(path.clone()),
            None => {
                info!("Backend is not installed");
                Err(SetupState::failed(
                    FailureKind::NotInstalled,
                    "the backend executable was not found on this computer",
                ))
            }
        }
    }

    /// `Starting` ⇄ `WaitingForHealth` until a probe succeeds.
    async fn launch_until_healthy(&self, binary: &Path) -> Outcome<HealthStatus> {
        let mut launches = 0;
        loop {
            self.enter(SetupState::Starting);
            launches += 1;

            let handle = self.launch(binary).await?;
            self.enter(SetupState::WaitingForHealth);

            match self.poll_health(&handle).await {
                Ok(status) => {
                    self.collab.supervisor.confirm_healthy(&handle).await;
                    return Ok(status);
                }
                Err(PollError::Died) => {
                    // Release the dead child so the next launch spawns afresh
                    self.collab.supervisor.stop(&handle).await;
                    if launches >= self.settings.max_launches {
                        warn!(launches, "Backend kept exiting while starting up");
                        return Err(SetupState::failed(
                            FailureKind::LaunchFailed,
                            "backend exited before becoming healthy",
                        ));
                    }
                    warn!(pid = ?handle.pid, launches, "Backend exited while starting up; relaunching");
                }
                Err(e) => {
                    return Err(SetupState::failed(
                        FailureKind::Timeout,
                        format!("backend did not become healthy: {e}"),
                    ));
                }
            }
        }
    }

    async fn launch(&self, binary: &Path) -> Outcome<ProcessHandle> {
        let supervisor = &*self.collab.supervisor;
        retry(
            &self.settings.launch_policy,
            move |_| supervisor.ensure_running(binary),
            LaunchError::is_retryable,
        )
        .await
        .map_err(|exhausted| {
            warn!(attempts = exhausted.attempts, "Backend launch failed: {}", exhausted.last);
            SetupState::failed(FailureKind::LaunchFailed, exhausted.last.to_string())
        })
    }

    async fn poll_health(&self, handle: &ProcessHandle) -> Result<HealthStatus, PollError> {
        let supervisor = &*self.collab.supervisor;
        let health = &*self.collab.health;
        let timeout = self.settings.probe_timeout;

        retry(
            &self.settings.health_policy,
            move |budget| async move {
                if !supervisor.is_alive(handle).await {
                    return Err(PollError::Died);
                }
                match health.probe(timeout).await {
                    Ok(status) if status.healthy => Ok(status),
                    Ok(_) => Err(PollError::NotHealthy),
                    Err(e) => {
                        if e.is_malformed() {
                            warn!(attempt = budget.attempt, "Status endpoint misbehaving: {}", e);
                        }
                        Err(PollError::Probe(e))
                    }
                }
            },
            |e| !matches!(e, PollError::Died),
        )
        .await
        .map_err(|exhausted| {
            debug!(attempts = exhausted.attempts, "Health polling stopped: {}", exhausted.last);
            exhausted.last
        })
    }

    async fn load_model(&self) -> Outcome<SetupState> {
        let loader = &*self.collab.loader;
        let failed = |message: String| SetupState::failed(FailureKind::ModelLoadFailed, message);

        loader.start().await.map_err(|e| failed(e.to_string()))?;

        let deadline = Instant::now() + self.settings.model_load_timeout;
        let mut ticker = interval(self.settings.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut unreachable = 0;

        loop {
            ticker.tick().await;
            if Instant::now() >= deadline {
                return Err(failed(format!(
                    "model did not finish loading within {}s",
                    self.settings.model_load_timeout.as_secs()
                )));
            }

            match loader.poll_progress(self.settings.probe_timeout).await {
                Ok(sample) => {
                    unreachable = 0;
                    let complete = sample.is_complete();
                    self.progress(sample);
                    if complete {
                        return Ok(SetupState::Ready);
                    }
                }
                Err(e) if e.is_transient() => {
                    unreachable += 1;
                    debug!(unreachable, "Progress poll failed: {}", e);
                    if unreachable >= self.settings.load_unreachable_limit {
                        return Err(failed(e.to_string()));
                    }
                }
                Err(e) => return Err(failed(e.to_string())),
            }
        }
    }
}
