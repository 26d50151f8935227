//! Rendering of setup events in the terminal.
//!
//! Two reporters share one trait: an `indicatif` display for people and
//! JSON lines for scripts.

use std::sync::{Mutex, MutexGuard, PoisonError};

use gemi_core::{ProgressSample, SetupEvent, SetupState, StateTransition};
use indicatif::{ProgressBar, ProgressStyle};

/// Receives setup events as they happen.
pub trait SetupReporter: Send + Sync {
    fn transition(&self, transition: &StateTransition);

    fn progress(&self, sample: &ProgressSample);

    /// Called once with the settled state.
    fn finish(&self, state: &SetupState);

    fn event(&self, event: &SetupEvent) {
        match event {
            SetupEvent::Transition(t) => self.transition(t),
            SetupEvent::Progress(sample) => self.progress(sample),
        }
    }
}

/// One line describing where setup is.
pub fn describe(transition: &StateTransition) -> String {
    match (&transition.to, transition.auto_retry_in) {
        (SetupState::Failed { message, .. }, Some(delay)) => {
            format!("{message} (retrying in {:.1}s)", delay.as_secs_f64())
        }
        (SetupState::Failed { message, .. }, None) => message.clone(),
        (to, _) => to.status_message(),
    }
}

/// Spinner while starting, percentage bar while loading.
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub const fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    }

    fn create_load_bar() -> ProgressBar {
        let pb = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupReporter for BarReporter {
    fn transition(&self, transition: &StateTransition) {
        let mut guard = self.bar();
        let message = describe(transition);

        match &transition.to {
            SetupState::LoadingModel { progress } => {
                if let Some(pb) = guard.take() {
                    pb.finish_and_clear();
                }
                let pb = Self::create_load_bar();
                pb.set_position(percent(*progress));
                pb.set_message(message);
                *guard = Some(pb);
            }
            SetupState::Failed { .. } if transition.auto_retry_in.is_some() => {
                match guard.as_ref() {
                    Some(pb) => pb.println(format!("⚠ {message}")),
                    None => eprintln!("⚠ {message}"),
                }
            }
            to if to.is_settled() => {}
            _ => match guard.as_ref() {
                Some(pb) if pb.length() != Some(100) => pb.set_message(message),
                _ => {
                    if let Some(pb) = guard.take() {
                        pb.finish_and_clear();
                    }
                    let pb = Self::create_spinner();
                    pb.set_message(message);
                    *guard = Some(pb);
                }
            },
        }
    }

    fn progress(&self, sample: &ProgressSample) {
        if let Some(pb) = self.bar().as_ref() {
            pb.set_position(u64::from(sample.percent()));
            pb.set_message(sample.message.clone());
        }
    }

    fn finish(&self, state: &SetupState) {
        let pb = self.bar().take();
        match (pb, state) {
            (Some(pb), SetupState::Ready) => {
                pb.finish_with_message(state.status_message());
            }
            (Some(pb), _) => pb.abandon_with_message(state.status_message()),
            (None, _) => println!("{}", state.status_message()),
        }
    }
}

/// Prints every event as one JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReporter;

impl JsonReporter {
    fn print(event: &SetupEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Could not serialize event: {}", e),
        }
    }
}

impl SetupReporter for JsonReporter {
    fn transition(&self, transition: &StateTransition) {
        Self::print(&SetupEvent::Transition(transition.clone()));
    }

    fn progress(&self, sample: &ProgressSample) {
        Self::print(&SetupEvent::Progress(sample.clone()));
    }

    fn finish(&self, _state: &SetupState) {}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemi_core::FailureKind;
    use std::time::Duration;

    #[test]
    fn pending_retry_mentions_the_delay() {
        let t = StateTransition::new(
            SetupState::Starting,
            SetupState::failed(FailureKind::LaunchFailed, "backend exited"),
        )
        .with_auto_retry(Duration::from_millis(2500));

        assert_eq!(describe(&t), "backend exited (retrying in 2.5s)");
    }

    #[test]
    fn other_states_use_their_status_message() {
        let t = StateTransition::new(SetupState::Checking, SetupState::Ready);
        assert_eq!(describe(&t), SetupState::Ready.status_message());
    }

    #[test]
    fn bar_reporter_handles_a_full_lifecycle() {
        let reporter = BarReporter::new();
        reporter.transition(&StateTransition::new(
            SetupState::Checking,
            SetupState::WaitingForHealth,
        ));
        reporter.transition(&StateTransition::new(
            SetupState::WaitingForHealth,
            SetupState::LoadingModel { progress: 0.0 },
        ));
        reporter.progress(&ProgressSample::new(0.5, "Loading model", true));
        reporter.finish(&SetupState::Ready);
        assert!(reporter.bar().is_none());
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent(-0.5), 0);
        assert_eq!(percent(0.43), 43);
        assert_eq!(percent(2.0), 100);
    }
}
