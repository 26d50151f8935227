//! The setup state machine's states and its legal edges.
//!
//! ```text
//! Checking ──found / already healthy──▶ WaitingForHealth
//! Checking ──missing──▶ Failed{NotInstalled}
//! WaitingForHealth ──healthy & loaded──▶ Ready
//! WaitingForHealth ──healthy & !loaded──▶ LoadingModel
//! WaitingForHealth ──not yet healthy──▶ Starting
//! WaitingForHealth ──attempts exhausted──▶ Failed{Timeout}
//! WaitingForHealth ──process died──▶ Failed{LaunchFailed}
//! Starting ──launched──▶ WaitingForHealth
//! Starting ──launch error──▶ Failed{LaunchFailed}
//! LoadingModel ──loaded──▶ Ready
//! LoadingModel ──load error──▶ Failed{ModelLoadFailed}
//! Failed{retryable} ──retry──▶ Checking
//! Failed ──install──▶ Installing ──ok──▶ Checking
//! Installing ──error──▶ Failed{NotInstalled}
//! any in-flight state ──cancel / unclassified──▶ Failed{Cancelled | Unknown}
//! Failed (auto-retry pending) ──cancel──▶ Failed{Cancelled}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a setup attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Backend binary not found on this host.
    NotInstalled,
    /// Process failed to spawn or exited before becoming healthy.
    LaunchFailed,
    /// Health probe never succeeded within the attempt budget.
    Timeout,
    /// Load was triggered but the model never became resident.
    ModelLoadFailed,
    /// Unclassified transport or internal error.
    Unknown,
    /// The caller cancelled the attempt.
    Cancelled,
}

impl FailureKind {
    /// Whether a new attempt can succeed without user intervention.
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::NotInstalled)
    }

    /// Whether the orchestrator may retry this failure on its own.
    ///
    /// Cancellation is retryable on request but never automatically.
    pub const fn allows_auto_retry(self) -> bool {
        self.is_retryable() && !matches!(self, Self::Cancelled)
    }

    /// Action the user has to take, for failures that need one.
    pub const fn remediation(self) -> Option<&'static str> {
        match self {
            Self::NotInstalled => Some("Install the Gemi inference backend, then run setup again."),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotInstalled => "not installed",
            Self::LaunchFailed => "launch failed",
            Self::Timeout => "timed out",
            Self::ModelLoadFailed => "model load failed",
            Self::Unknown => "unknown error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Current position in the setup lifecycle.
///
/// Exactly one value is live per orchestrator and it is the single source
/// of truth for "can the app use AI features now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SetupState {
    /// Looking for the backend (reachability, then installation).
    Checking,
    /// Running the external installer.
    Installing,
    /// Launching the backend process.
    Starting,
    /// Polling the status endpoint until the backend answers.
    WaitingForHealth,
    /// Model is being loaded into memory.
    LoadingModel {
        /// Advisory completion estimate in `0.0..=1.0`.
        progress: f64,
    },
    /// Backend healthy with the model resident.
    Ready,
    /// The attempt failed.
    Failed {
        /// Classification of the failure.
        kind: FailureKind,
        /// Human-readable detail.
        message: String,
        /// Whether `retry()` is allowed.
        retryable: bool,
    },
}

/// Data-free discriminant of [`SetupState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    Checking,
    Installing,
    Starting,
    WaitingForHealth,
    LoadingModel,
    Ready,
    Failed,
}

impl SetupState {
    /// Failure whose retryability follows from its kind.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// Discriminant without payload.
    pub const fn phase(&self) -> SetupPhase {
        match self {
            Self::Checking => SetupPhase::Checking,
            Self::Installing => SetupPhase::Installing,
            Self::Starting => SetupPhase::Starting,
            Self::WaitingForHealth => SetupPhase::WaitingForHealth,
            Self::LoadingModel { .. } => SetupPhase::LoadingModel,
            Self::Ready => SetupPhase::Ready,
            Self::Failed { .. } => SetupPhase::Failed,
        }
    }

    /// AI features are usable.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// No attempt can be making progress from here (`Ready` or `Failed`).
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed { .. })
    }

    /// Final without user intervention: `Ready` or a non-retryable failure.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ready
                | Self::Failed {
                    retryable: false,
                    ..
                }
        )
    }

    /// Failure kind, when failed.
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Load progress, when loading.
    pub const fn progress(&self) -> Option<f64> {
        match self {
            Self::LoadingModel { progress } => Some(*progress),
            _ => None,
        }
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use FailureKind as K;
        use SetupState as S;

        // Cancellation and unclassified errors can interrupt any in-flight step;
        // cancellation also stops a failure that is waiting for its auto-retry.
        match next {
            S::Failed { kind: K::Unknown, .. } => return !self.is_settled(),
            S::Failed { kind: K::Cancelled, .. } => {
                return match self {
                    S::Failed { kind, .. } => *kind != K::Cancelled,
                    other => !other.is_settled(),
                };
            }
            _ => {}
        }

        match (self, next) {
            (S::Checking, S::WaitingForHealth) => true,
            (S::Checking, S::Failed { kind, .. }) => *kind == K::NotInstalled,

            (S::WaitingForHealth, S::Ready | S::LoadingModel { .. } | S::Starting) => true,
            (S::WaitingForHealth, S::Failed { kind, .. }) => {
                matches!(kind, K::Timeout | K::LaunchFailed)
            }

            (S::Starting, S::WaitingForHealth) => true,
            (S::Starting, S::Failed { kind, .. }) => *kind == K::LaunchFailed,

            (S::LoadingModel { .. }, S::Ready) => true,
            (S::LoadingModel { .. }, S::Failed { kind, .. }) => *kind == K::ModelLoadFailed,

            (S::Failed { retryable, .. }, S::Checking) => *retryable,
            (S::Failed { .. }, S::Installing) => true,

            (S::Installing, S::Checking) => true,
            (S::Installing, S::Failed { kind, .. }) => *kind == K::NotInstalled,

            _ => false,
        }
    }

    /// One-line status suitable for showing to the user.
    pub fn status_message(&self) -> String {
        match self {
            Self::Checking => "Checking for the AI backend…".to_string(),
            Self::Installing => "Installing the AI backend…".to_string(),
            Self::Starting => "Starting the AI backend…".to_string(),
            Self::WaitingForHealth => "Waiting for the AI backend to respond…".to_string(),
            Self::LoadingModel { progress } => {
                format!("Loading model… {:.0}%", progress * 100.0)
            }
            Self::Ready => "AI features are ready".to_string(),
            Self::Failed { kind, message, .. } => match kind.remediation() {
                Some(hint) => format!("Setup failed ({kind}): {message}. {hint}"),
                None => format!("Setup failed ({kind}): {message}"),
            },
        }
    }
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingModel { progress } => write!(f, "LoadingModel({:.0}%)", progress * 100.0),
            Self::Failed { kind, .. } => write!(f, "Failed({kind})"),
            other => write!(f, "{:?}", other.phase()),
        }
    }
}
