//! Setup orchestrator: the one state machine deciding whether AI features
//! can be used.
//!
//! A single actor task owns the [`SetupState`]. Callers talk to it through
//! [`SetupOrchestrator`], a cheap cloneable handle; each attempt runs in its
//! own task and reports steps back to the actor, which validates every edge
//! before publishing it.

mod actor;
mod attempt;

use gemi_core::{
    BackendSettings, HealthClient, InstallationProbe, Installer, ModelLoadTrigger,
    ProcessSupervisor, SettingsError, SetupPhase, SetupState,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::events::{EventSink, Subscription, SubscriptionId};
use actor::{Actor, Command};

/// Everything the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn InstallationProbe>,
    pub health: Arc<dyn HealthClient>,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub loader: Arc<dyn ModelLoadTrigger>,
    pub installer: Arc<dyn Installer>,
}

/// Errors returned by [`SetupOrchestrator`] calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The orchestrator has been shut down.
    #[error("setup orchestrator has shut down")]
    ShutDown,

    /// An attempt is already running.
    #[error("a setup attempt is already in progress")]
    Busy,

    /// The current failure cannot be retried without user action.
    #[error("setup cannot be retried: {0}")]
    NotRetryable(String),

    /// The call makes no sense in the current state.
    #[error("not allowed while {0:?}")]
    InvalidState(SetupPhase),
}

/// Handle to the running orchestrator.
///
/// Clones share the same actor. The actor stops (and terminates the backend
/// it owns) on [`shutdown`](Self::shutdown) or when the last handle drops.
#[derive(Clone)]
pub struct SetupOrchestrator {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SetupState>,
    events: Arc<EventSink>,
}

impl SetupOrchestrator {
    /// Spawn the orchestrator actor. Must be called within a Tokio runtime.
    ///
    /// The initial state is `Checking` with no attempt running; call
    /// [`run`](Self::run) to start one. Settings are validated first, so an
    /// attempt never starts with values it cannot work with.
    pub fn start(
        settings: BackendSettings,
        collaborators: Collaborators,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let events = Arc::new(EventSink::new());
        let (state_tx, state_rx) = watch::channel(SetupState::Checking);
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Actor::new(
            Arc::new(settings),
            collaborators,
            state_tx,
            Arc::clone(&events),
            command_rx,
        );
        tokio::spawn(actor.run());

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            events,
        })
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<SetupState, OrchestratorError>>) -> Command,
    ) -> Result<SetupState, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| OrchestratorError::ShutDown)?;
        rx.await.map_err(|_| OrchestratorError::ShutDown)?
    }

    /// Bring the backend to `Ready`, returning the settled state.
    ///
    /// Joins the attempt already in flight instead of starting a second one,
    /// so concurrent callers observe the same outcome. On an already settled
    /// state this returns immediately.
    pub async fn run(&self) -> Result<SetupState, OrchestratorError> {
        self.request(|reply| Command::Run { reply }).await
    }

    /// Start over from `Checking` after a retryable failure.
    ///
    /// Skips the wait of a scheduled automatic retry and restores the full
    /// automatic retry budget.
    pub async fn retry(&self) -> Result<SetupState, OrchestratorError> {
        self.request(|reply| Command::Retry { reply }).await
    }

    /// Run the installer after a failure, then continue from `Checking`.
    pub async fn install(&self) -> Result<SetupState, OrchestratorError> {
        self.request(|reply| Command::Install { reply }).await
    }

    /// Cancel the running attempt or pending automatic retry.
    ///
    /// Returns the state after cancellation; a no-op when nothing runs.
    pub async fn cancel(&self) -> Result<SetupState, OrchestratorError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Cancel any attempt, terminate an owned backend and stop the actor.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply: tx })
            .await
            .map_err(|_| OrchestratorError::ShutDown)?;
        rx.await.map_err(|_| OrchestratorError::ShutDown)
    }

    /// Current state.
    pub fn state(&self) -> SetupState {
        self.state.borrow().clone()
    }

    /// Current state as a user-facing sentence.
    pub fn status_message(&self) -> String {
        self.state.borrow().status_message()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<SetupState> {
        self.state.clone()
    }

    /// Listen for transitions and progress samples.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}
