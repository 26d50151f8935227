//! Typed events published by the setup orchestrator.
//!
//! Listeners receive every [`StateTransition`] in order; [`ProgressSample`]s
//! may be coalesced so a slow listener only sees the latest one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ProgressSample;
use crate::state::SetupState;

/// One edge taken by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    /// State before the edge.
    pub from: SetupState,
    /// State after the edge.
    pub to: SetupState,
    /// Set on a retryable `Failed` that the orchestrator will leave on its
    /// own after this delay. Listeners usually hide such failures.
    #[serde(
        default,
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_retry_in: Option<Duration>,
    /// When the edge was taken.
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: SetupState, to: SetupState) -> Self {
        Self {
            from,
            to,
            auto_retry_in: None,
            at: Utc::now(),
        }
    }

    /// Mark this failure as one the orchestrator retries after `delay`.
    #[must_use]
    pub const fn with_auto_retry(mut self, delay: Duration) -> Self {
        self.auto_retry_in = Some(delay);
        self
    }

    /// Whether the new state is a failure the user should see.
    pub const fn is_final_failure(&self) -> bool {
        matches!(self.to, SetupState::Failed { .. }) && self.auto_retry_in.is_none()
    }
}

/// Everything a listener can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetupEvent {
    /// The orchestrator changed state. Never dropped.
    Transition(StateTransition),
    /// Latest model-load progress. May be coalesced.
    Progress(ProgressSample),
}

impl SetupEvent {
    /// Name used in logs.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Transition(_) => "transition",
            Self::Progress(_) => "progress",
        }
    }
}

impl From<StateTransition> for SetupEvent {
    fn from(transition: StateTransition) -> Self {
        Self::Transition(transition)
    }
}

impl From<ProgressSample> for SetupEvent {
    fn from(sample: ProgressSample) -> Self {
        Self::Progress(sample)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureKind;

    #[test]
    fn auto_retry_failures_are_not_final() {
        let failed = SetupState::failed(FailureKind::Timeout, "slow");
        let t = StateTransition::new(SetupState::WaitingForHealth, failed.clone());
        assert!(t.is_final_failure());
        let t = t.with_auto_retry(Duration::from_secs(2));
        assert!(!t.is_final_failure());
    }

    #[test]
    fn auto_retry_serializes_as_millis() {
        let t = StateTransition::new(
            SetupState::Starting,
            SetupState::failed(FailureKind::LaunchFailed, "boom"),
        )
        .with_auto_retry(Duration::from_millis(1500));
        let json = serde_json::to_value(SetupEvent::from(t)).unwrap();
        assert_eq!(json["type"], "transition");
        assert_eq!(json["autoRetryIn"], 1500);
    }
}
