//! The task that owns the setup state.

use gemi_core::{BackendSettings, FailureKind, ProgressSample, SetupState, StateTransition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::attempt::{Attempt, Mode, Step, StepMsg};
use super::{Collaborators, OrchestratorError};
use crate::events::EventSink;

type Reply = oneshot::Sender<Result<SetupState, OrchestratorError>>;

pub(super) enum Command {
    Run { reply: Reply },
    Retry { reply: Reply },
    Install { reply: Reply },
    Cancel { reply: Reply },
    Shutdown { reply: oneshot::Sender<()> },
}

struct Running {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub(super) struct Actor {
    settings: Arc<BackendSettings>,
    collab: Collaborators,
    state: SetupState,
    state_tx: watch::Sender<SetupState>,
    events: Arc<EventSink>,
    commands: mpsc::Receiver<Command>,
    steps_tx: mpsc::UnboundedSender<StepMsg>,
    steps_rx: mpsc::UnboundedReceiver<StepMsg>,
    running: Option<Running>,
    /// When the scheduled automatic retry fires.
    retry_at: Option<Instant>,
    /// Attempts made since the last caller-initiated start.
    attempts_in_cycle: u32,
    next_attempt_id: u64,
    /// Highest progress published in the current attempt.
    progress_floor: f64,
    waiters: Vec<Reply>,
}

impl Actor {
    pub(super) fn new(
        settings: Arc<BackendSettings>,
        collab: Collaborators,
        state_tx: watch::Sender<SetupState>,
        events: Arc<EventSink>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (steps_tx, steps_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            collab,
            state: SetupState::Checking,
            state_tx,
            events,
            commands,
            steps_tx,
            steps_rx,
            running: None,
            retry_at: None,
            attempts_in_cycle: 0,
            next_attempt_id: 0,
            progress_floor: 0.0,
            waiters: Vec::new(),
        }
    }

    pub(super) async fn run(mut self) {
        info!("Setup orchestrator started");
        let mut shutdown_reply = None;

        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(msg) = self.steps_rx.recv() => self.on_step(msg),
                (id, joined) = join_attempt(&mut self.running), if self.running.is_some() => {
                    self.on_attempt_exit(id, joined);
                }
                () = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.begin(Mode::Setup);
                }
            }
        }

        self.teardown().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("Setup orchestrator stopped");
    }

    /// An attempt is running or an automatic retry is scheduled.
    const fn busy(&self) -> bool {
        self.running.is_some() || self.retry_at.is_some()
    }

    /// Nothing has run yet.
    fn pristine(&self) -> bool {
        !self.busy() && self.state == SetupState::Checking
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Run { reply } => {
                if self.pristine() {
                    self.attempts_in_cycle = 0;
                    self.begin(Mode::Setup);
                }
                if self.busy() {
                    self.waiters.push(reply);
                } else {
                    let _ = reply.send(Ok(self.state.clone()));
                }
            }
            Command::Retry { reply } => {
                if self.running.is_some() {
                    let _ = reply.send(Err(OrchestratorError::Busy));
                    return;
                }
                match &self.state {
                    SetupState::Ready => {
                        let _ = reply.send(Ok(SetupState::Ready));
                    }
                    SetupState::Failed {
                        retryable: false,
                        message,
                        ..
                    } => {
                        let _ = reply.send(Err(OrchestratorError::NotRetryable(message.clone())));
                    }
                    _ => {
                        self.retry_at = None;
                        self.attempts_in_cycle = 0;
                        self.begin(Mode::Setup);
                        self.waiters.push(reply);
                    }
                }
            }
            Command::Install { reply } => {
                if self.running.is_some() {
                    let _ = reply.send(Err(OrchestratorError::Busy));
                    return;
                }
                if !matches!(self.state, SetupState::Failed { .. }) {
                    let _ = reply.send(Err(OrchestratorError::InvalidState(self.state.phase())));
                    return;
                }
                self.retry_at = None;
                self.attempts_in_cycle = 0;
                self.begin(Mode::Install);
                self.waiters.push(reply);
            }
            Command::Cancel { reply } => {
                self.cancel("setup was cancelled");
                let _ = reply.send(Ok(self.state.clone()));
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Start a new attempt from the current (idle) state.
    fn begin(&mut self, mode: Mode) {
        let first = match mode {
            Mode::Setup => SetupState::Checking,
            Mode::Install => SetupState::Installing,
        };
        if self.state != first && !self.transition(first, None) {
            self.resolve_waiters();
            return;
        }

        self.next_attempt_id += 1;
        self.attempts_in_cycle += 1;
        self.progress_floor = 0.0;
        self.events.reset_progress();

        let id = self.next_attempt_id;
        let cancel = CancellationToken::new();
        let attempt = Attempt {
            id,
            settings: Arc::clone(&self.settings),
            collab: self.collab.clone(),
            steps: self.steps_tx.clone(),
            cancel: cancel.clone(),
        };
        debug!(
            attempt = id,
            ?mode,
            cycle = self.attempts_in_cycle,
            subscribers = self.events.subscriber_count(),
            "Starting setup attempt"
        );
        let task = tokio::spawn(attempt.run(mode));
        self.running = Some(Running { id, cancel, task });
    }

    fn on_step(&mut self, msg: StepMsg) {
        if self.running.as_ref().map(|r| r.id) != Some(msg.attempt) {
            debug!(attempt = msg.attempt, "Ignoring step from a finished attempt");
            return;
        }

        match msg.step {
            Step::Progress(sample) => self.on_progress(sample),
            Step::Enter(next) if next.is_settled() => self.settle(next),
            Step::Enter(next) => {
                if !self.transition(next, None) {
                    self.abort_attempt();
                    self.settle(SetupState::failed(
                        FailureKind::Unknown,
                        "setup reached an unexpected state",
                    ));
                }
            }
        }
    }

    /// The attempt task finished. A task that ends without reporting a
    /// settled state (a panic in a collaborator) settles as `Unknown`.
    fn on_attempt_exit(&mut self, id: u64, joined: Result<(), JoinError>) {
        // Steps are sent before the task returns, so they are already queued
        while let Ok(msg) = self.steps_rx.try_recv() {
            self.on_step(msg);
        }
        if self.running.as_ref().map(|r| r.id) != Some(id) {
            return;
        }

        self.running = None;
        let outcome = match joined {
            Err(e) if e.is_panic() => {
                error!(attempt = id, "Setup attempt panicked");
                SetupState::failed(FailureKind::Unknown, "setup attempt crashed")
            }
            _ => SetupState::failed(FailureKind::Unknown, "setup attempt ended unexpectedly"),
        };
        self.settle(outcome);
    }

    fn on_progress(&mut self, sample: ProgressSample) {
        if !matches!(self.state, SetupState::LoadingModel { .. }) {
            return;
        }
        let sample = sample.at_least(self.progress_floor);
        self.progress_floor = sample.fraction;
        self.state = SetupState::LoadingModel {
            progress: sample.fraction,
        };
        self.state_tx.send_replace(self.state.clone());
        self.events.publish_progress(sample);
    }

    /// The running attempt ended in `outcome`.
    fn settle(&mut self, outcome: SetupState) {
        self.running = None;

        let auto_retry = match &outcome {
            SetupState::Failed { kind, .. }
                if kind.allows_auto_retry()
                    && self.settings.setup_policy.allows_another(self.attempts_in_cycle) =>
            {
                Some(self.settings.setup_policy.delay_after(self.attempts_in_cycle))
            }
            _ => None,
        };

        if !self.transition(outcome, auto_retry) {
            // Only reachable if an attempt reports an illegal final edge.
            let fallback = SetupState::failed(FailureKind::Unknown, "setup ended unexpectedly");
            let _ = self.transition(fallback, None);
            self.resolve_waiters();
            return;
        }

        match auto_retry {
            Some(delay) => {
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt = self.attempts_in_cycle,
                    "Retrying setup automatically"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                if self.state.is_ready() {
                    self.attempts_in_cycle = 0;
                }
                self.resolve_waiters();
            }
        }
    }

    fn cancel(&mut self, reason: &str) {
        let cancelled = SetupState::failed(FailureKind::Cancelled, reason);
        if self.running.is_some() {
            self.abort_attempt();
        } else if self.retry_at.take().is_none() {
            return;
        }
        if !self.transition(cancelled, None) {
            warn!(state = %self.state, "Cancellation had no effect");
        }
        self.resolve_waiters();
    }

    fn abort_attempt(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            // The attempt stops at its next await point
            drop(running.task);
        }
    }

    /// Move to `next` if the edge is legal, publishing it.
    fn transition(&mut self, next: SetupState, auto_retry: Option<Duration>) -> bool {
        if !self.state.can_transition_to(&next) {
            warn!(from = %self.state, to = %next, "Rejected illegal setup transition");
            return false;
        }

        let mut event = StateTransition::new(self.state.clone(), next.clone());
        if let Some(delay) = auto_retry {
            event = event.with_auto_retry(delay);
        }

        match &next {
            SetupState::Failed { kind, message, .. } => {
                warn!(from = %self.state, %kind, auto_retry = auto_retry.is_some(), "Setup failed: {}", message);
            }
            _ => info!(from = %self.state, to = %next, "Setup state changed"),
        }

        self.state = next;
        self.state_tx.send_replace(self.state.clone());
        self.events.publish_transition(event);
        true
    }

    fn resolve_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(self.state.clone()));
        }
    }

    async fn teardown(&mut self) {
        self.cancel("setup orchestrator shut down");
        self.collab.supervisor.shutdown().await;
        self.resolve_waiters();
    }
}

/// Wait for the running attempt's task. Pending forever when none runs.
async fn join_attempt(running: &mut Option<Running>) -> (u64, Result<(), JoinError>) {
    match running {
        Some(running) => (running.id, (&mut running.task).await),
        None => std::future::pending().await,
    }
}
