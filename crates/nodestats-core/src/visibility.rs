//! Foreground/background gating of live chart activity.
//!
//! A chart polled while the view is in the background gets clamped, late
//! timer callbacks and ends up with gaps. The gate stops the aggregate chart
//! when the view is hidden and restarts it when it comes back, but only if
//! the chart would be running anyway.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::event::SessionEvent;
use crate::lifecycle::GraphLifecycle;
use crate::query::Tab;

/// Whether the view is in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_hidden(self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}

/// Callback invoked on every visibility transition.
pub type VisibilityHandler = Box<dyn Fn(Visibility) + Send + Sync>;

/// Source of the process-wide visibility signal.
pub trait VisibilityObserver: Send + Sync {
    /// Visibility right now.
    fn current(&self) -> Visibility;

    /// Register `handler` for future transitions until the subscription is released.
    fn on_visibility_change(&self, handler: VisibilityHandler) -> Subscription;
}

/// A registration with a [`VisibilityObserver`]; released on drop.
#[must_use = "dropping a subscription unregisters the handler"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// [`VisibilityObserver`] backed by a `tokio::sync::watch` channel.
///
/// Each registration runs a small task that forwards changes to its handler.
/// Must be registered from within a tokio runtime.
#[derive(Clone)]
pub struct WatchVisibility {
    tx: Arc<watch::Sender<Visibility>>,
    active: Arc<Mutex<usize>>,
}

impl fmt::Debug for WatchVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchVisibility")
            .field("current", &*self.tx.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for WatchVisibility {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}

impl WatchVisibility {
    pub fn new(initial: Visibility) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            active: Arc::new(Mutex::new(0)),
        }
    }

    /// Publish a transition. Repeating the current value is ignored.
    pub fn set(&self, visibility: Visibility) {
        self.tx.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
    }

    /// Number of handlers currently registered.
    pub fn subscriber_count(&self) -> usize {
        *self.active.lock()
    }
}

impl VisibilityObserver for WatchVisibility {
    fn current(&self) -> Visibility {
        *self.tx.borrow()
    }

    fn on_visibility_change(&self, handler: VisibilityHandler) -> Subscription {
        let mut rx = self.tx.subscribe();

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let visibility = *rx.borrow_and_update();
                handler(visibility);
            }
        });

        *self.active.lock() += 1;
        let active = Arc::clone(&self.active);
        Subscription::new(move || {
            task.abort();
            let mut count = active.lock();
            *count = count.saturating_sub(1);
        })
    }
}

/// Inputs the gate needs to decide whether the aggregate chart may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInputs {
    pub chart_step_seconds: u64,
    pub graphs_open: bool,
    pub tab: Tab,
}

/// Whether a foregrounded view should restart an existing aggregate chart.
pub fn should_resume(inputs: GateInputs) -> bool {
    inputs.chart_step_seconds != 0 && inputs.graphs_open && inputs.tab.is_summary()
}

/// Holds the observer registration and applies transitions to the charts.
///
/// The summary refresh timer is not touched; the table keeps refreshing in
/// the background.
#[derive(Debug)]
pub struct VisibilityGate {
    subscription: Option<Subscription>,
    visibility: Visibility,
}

impl VisibilityGate {
    /// Register with `observer`, forwarding transitions into the session queue.
    pub fn register(
        observer: &dyn VisibilityObserver,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let subscription = observer.on_visibility_change(Box::new(move |visibility| {
            let _ = events.send(SessionEvent::Visibility(visibility));
        }));
        Self {
            subscription: Some(subscription),
            visibility: observer.current(),
        }
    }

    /// Last known visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Whether the observer registration is still held.
    pub fn is_registered(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether the aggregate chart may run right now.
    pub fn allows_running(&self, inputs: GateInputs) -> bool {
        !self.visibility.is_hidden() && should_resume(inputs)
    }

    /// React to a transition.
    pub fn apply(&mut self, visibility: Visibility, lifecycle: &mut GraphLifecycle, inputs: GateInputs) {
        self.visibility = visibility;
        if !lifecycle.has_aggregate() {
            return;
        }

        match visibility {
            Visibility::Hidden => {
                debug!("View hidden, pausing aggregate chart");
                lifecycle.suspend();
            }
            Visibility::Visible if should_resume(inputs) => {
                debug!("View visible, resuming aggregate chart");
                lifecycle.resume();
            }
            Visibility::Visible => {
                debug!(?inputs, "View visible, aggregate chart stays paused");
            }
        }
    }

    /// Drop the observer registration. Idempotent.
    pub fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inputs(step: u64, open: bool, tab: Tab) -> GateInputs {
        GateInputs {
            chart_step_seconds: step,
            graphs_open: open,
            tab,
        }
    }

    #[test]
    fn test_resume_requires_every_condition() {
        assert!(should_resume(inputs(5, true, Tab::Summary)));
        assert!(!should_resume(inputs(0, true, Tab::Summary)));
        assert!(!should_resume(inputs(5, false, Tab::Summary)));
        assert!(!should_resume(inputs(5, true, Tab::Other(1))));
    }

    #[tokio::test]
    async fn test_watch_forwards_changes_until_released() {
        let observer = WatchVisibility::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sub = observer.on_visibility_change(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(observer.subscriber_count(), 1);

        observer.set(Visibility::Hidden);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Same value again is not a transition.
        observer.set(Visibility::Hidden);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert_eq!(observer.subscriber_count(), 0);
        observer.set(Visibility::Visible);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_release_is_idempotent() {
        let observer = WatchVisibility::new(Visibility::Hidden);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut gate = VisibilityGate::register(&observer, tx);
        assert_eq!(gate.visibility(), Visibility::Hidden);
        assert!(gate.is_registered());

        gate.release();
        gate.release();
        assert!(!gate.is_registered());
        assert_eq!(observer.subscriber_count(), 0);
    }
}
