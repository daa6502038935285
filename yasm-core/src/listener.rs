//! Transition listeners.
//!
//! Listeners are notified synchronously on the firing thread after the
//! executor has moved to the target state, before the target's entry actions
//! run.

use crate::definition::State;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Observer of completed external transitions.
pub trait TransitionListener: Send + Sync {
    fn on_transition(&self, from: &State, to: &State, event: &str);
}

impl<F> TransitionListener for F
where
    F: Fn(&State, &State, &str) + Send + Sync,
{
    fn on_transition(&self, from: &State, to: &State, event: &str) {
        self(from, to, event)
    }
}

/// Shared, copy-on-write set of listeners.
///
/// Membership is by `Arc` identity: adding the same listener twice is a
/// no-op. Notification walks a snapshot, so listeners registered while a
/// notification is in flight are not guaranteed to see it.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<RwLock<Arc<Vec<Arc<dyn TransitionListener>>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener, returning false if it was already present.
    pub fn add(&self, listener: Arc<dyn TransitionListener>) -> bool {
        let mut guard = self.inner.write();
        if guard.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    /// Notifies every listener present when the call began.
    pub fn notify(&self, from: &State, to: &State, event: &str) {
        let snapshot = self.inner.read().clone();
        for listener in snapshot.iter() {
            listener.on_transition(from, to, event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Owned record of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub from: String,
    pub to: String,
    pub event: String,
}

/// Listener that records every transition it observes, in order.
#[derive(Debug, Default)]
pub struct TransitionLog {
    events: Mutex<Vec<TransitionEvent>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TransitionListener for TransitionLog {
    fn on_transition(&self, from: &State, to: &State, event: &str) {
        self.events.lock().push(TransitionEvent {
            from: from.id().to_string(),
            to: to.id().to_string(),
            event: event.to_string(),
        });
    }
}
