//! Single-writer broadcast of setup events.
//!
//! Transitions go through one unbounded queue per subscriber, so none is
//! ever dropped and the writer never waits. Progress samples share a `watch`
//! slot: a slow subscriber only sees the latest one.

use gemi_core::{ProgressSample, SetupEvent, StateTransition};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Identifies one subscription for [`EventSink::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<StateTransition>>,
}

/// Publishes [`SetupEvent`]s to any number of listeners.
pub struct EventSink {
    subscribers: Mutex<Subscribers>,
    progress: watch::Sender<Option<ProgressSample>>,
}

impl EventSink {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            subscribers: Mutex::new(Subscribers::default()),
            progress,
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. Only events published after this call are seen.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut subs = self.subscribers();
            let id = subs.next_id;
            subs.next_id += 1;
            subs.senders.insert(id, tx);
            id
        };
        debug!(subscriber = id, "Setup event subscriber added");

        Subscription {
            id: SubscriptionId(id),
            transitions: rx,
            progress: self.progress.subscribe(),
            progress_open: true,
            sink: Arc::downgrade(self),
        }
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers().senders.remove(&id.0).is_some();
        if removed {
            debug!(subscriber = id.0, "Setup event subscriber removed");
        }
        removed
    }

    /// Deliver a transition to every listener. Never blocks.
    pub fn publish_transition(&self, transition: StateTransition) {
        let mut subs = self.subscribers();
        trace!(
            from = %transition.from,
            to = %transition.to,
            subscribers = subs.senders.len(),
            "Publishing transition"
        );
        // Receivers dropped without unsubscribing are pruned here
        subs.senders
            .retain(|_, tx| tx.send(transition.clone()).is_ok());
    }

    /// Replace the latest progress sample.
    pub fn publish_progress(&self, sample: ProgressSample) {
        self.progress.send_replace(Some(sample));
    }

    /// Clear progress at the start of a new attempt.
    pub fn reset_progress(&self) {
        self.progress.send_replace(None);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().senders.len()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of an [`EventSink`] registration.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    transitions: mpsc::UnboundedReceiver<StateTransition>,
    progress: watch::Receiver<Option<ProgressSample>>,
    progress_open: bool,
    sink: Weak<EventSink>,
}

impl Subscription {
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event. Pending transitions are delivered before progress.
    ///
    /// Returns `None` once the sink is gone or this subscription was removed.
    pub async fn recv(&mut self) -> Option<SetupEvent> {
        loop {
            tokio::select! {
                biased;

                transition = self.transitions.recv() => {
                    return transition.map(SetupEvent::Transition);
                }
                changed = self.progress.changed(), if self.progress_open => {
                    if changed.is_err() {
                        self.progress_open = false;
                        continue;
                    }
                    if let Some(sample) = self.progress.borrow_and_update().clone() {
                        return Some(SetupEvent::Progress(sample));
                    }
                }
            }
        }
    }

    /// Next transition, skipping progress.
    pub async fn recv_transition(&mut self) -> Option<StateTransition> {
        self.transitions.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SetupEvent> {
        if let Ok(transition) = self.transitions.try_recv() {
            return Some(SetupEvent::Transition(transition));
        }
        if self.progress.has_changed().unwrap_or(false) {
            return self
                .progress
                .borrow_and_update()
                .clone()
                .map(SetupEvent::Progress);
        }
        None
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemi_core::SetupState;

    fn transition(to: SetupState) -> StateTransition {
        StateTransition::new(SetupState::Checking, to)
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_transition() {
        let sink = Arc::new(EventSink::new());
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.publish_transition(transition(SetupState::WaitingForHealth));
        sink.publish_transition(transition(SetupState::Starting));

        for sub in [&mut a, &mut b] {
            let first = sub.recv_transition().await.unwrap();
            let second = sub.recv_transition().await.unwrap();
            assert_eq!(first.to, SetupState::WaitingForHealth);
            assert_eq!(second.to, SetupState::Starting);
        }
    }

    #[tokio::test]
    async fn progress_is_coalesced_to_latest() {
        let sink = Arc::new(EventSink::new());
        let mut sub = sink.subscribe();

        for fraction in [0.1, 0.2, 0.3] {
            sink.publish_progress(ProgressSample::new(fraction, "loading", true));
        }

        match sub.recv().await {
            Some(SetupEvent::Progress(sample)) => {
                assert!((sample.fraction - 0.3).abs() < f64::EPSILON);
            }
            other => panic!("expected progress, got {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn transitions_are_delivered_before_progress() {
        let sink = Arc::new(EventSink::new());
        let mut sub = sink.subscribe();

        sink.publish_progress(ProgressSample::new(0.5, "loading", true));
        sink.publish_transition(transition(SetupState::WaitingForHealth));

        assert!(matches!(sub.recv().await, Some(SetupEvent::Transition(_))));
        assert!(matches!(sub.recv().await, Some(SetupEvent::Progress(_))));
    }

    #[tokio::test]
    async fn reset_progress_is_not_delivered() {
        let sink = Arc::new(EventSink::new());
        let mut sub = sink.subscribe();
        sink.publish_progress(ProgressSample::new(0.5, "loading", true));
        sink.reset_progress();
        assert!(sub.try_recv().is_none());
        assert!(sink.progress.borrow().is_none());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let sink = Arc::new(EventSink::new());
        let sub = sink.subscribe();
        let other = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        drop(sub);
        assert_eq!(sink.subscriber_count(), 1);

        assert!(sink.unsubscribe(other.id()));
        assert!(!sink.unsubscribe(other.id()));
    }

    #[tokio::test]
    async fn unsubscribed_receiver_ends() {
        let sink = Arc::new(EventSink::new());
        let mut sub = sink.subscribe();
        sink.unsubscribe(sub.id());
        sink.publish_transition(transition(SetupState::Starting));
        assert!(sub.recv_transition().await.is_none());
    }
}
