//! Executor - drives one running instance of a machine.

use crate::capability::ActionRef;
use crate::context::Context;
use crate::definition::{Machine, State, StateId, Transition};
use crate::error::ExecutionError;
use crate::listener::{ListenerSet, TransitionListener};
use std::sync::Arc;

/// Result of firing an event.
///
/// Only `Internal` and `Transitioned` mean something ran; the other variants
/// report why the event was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The current state is final.
    Final,
    /// No transition of the current state handles the event.
    Unhandled,
    /// Every candidate transition's condition was false.
    Rejected,
    /// A transition without a target ran its actions.
    Internal,
    /// The executor moved to a new state.
    Transitioned { from: String, to: String },
}

impl Outcome {
    /// Returns whether any transition was taken.
    pub fn fired(&self) -> bool {
        matches!(self, Outcome::Internal | Outcome::Transitioned { .. })
    }
}

/// Interpreter for a shared [`Machine`] over an owned [`Context`].
///
/// All mutating operations take `&mut self`; an executor shared between
/// threads must be guarded by the caller.
pub struct Executor {
    machine: Arc<Machine>,
    context: Context,
    current: StateId,
    listeners: ListenerSet,
}

impl Executor {
    /// Creates an executor positioned at the machine's initial state.
    ///
    /// Entry actions of the initial state are not run; call [`start`](Self::start).
    pub fn new(machine: Arc<Machine>, context: Context) -> Self {
        let current = machine.initial_id();
        Self {
            machine,
            context,
            current,
            listeners: ListenerSet::new(),
        }
    }

    /// Returns to the initial state without running any actions.
    pub fn reset(&mut self) {
        self.current = self.machine.initial_id();
        tracing::debug!(state = self.current_state().id(), "executor reset");
    }

    /// Runs the current state's entry actions.
    ///
    /// Each call runs them again.
    pub fn start(&mut self) -> Result<(), ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let state = machine.state_at(self.current);
        tracing::debug!(state = state.id(), "starting executor");
        run_actions(state.entry_actions(), &mut self.context)
    }

    /// Adds a listener; returns false if that listener was already added.
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Shared handle to this executor's listeners.
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Fires an event.
    ///
    /// The first transition of the current state whose event matches and
    /// whose condition holds is taken; later candidates are not evaluated.
    /// For an external transition the order is: exit actions of the current
    /// state, transition actions, state change, listener notification, entry
    /// actions of the new state. Internal transitions only run their actions.
    ///
    /// A failing capability aborts the call; actions that already ran are not
    /// undone.
    pub fn fire(&mut self, event: &str) -> Result<Outcome, ExecutionError> {
        let machine = Arc::clone(&self.machine);
        let state = machine.state_at(self.current);
        tracing::debug!(event, state = state.id(), "firing event");

        if state.is_final() {
            tracing::debug!(event, state = state.id(), "state is final, ignoring event");
            return Ok(Outcome::Final);
        }

        let Some(transition) = self.select(state, event)? else {
            return Ok(if state.transitions_for(event).next().is_none() {
                tracing::debug!(event, state = state.id(), "no transition for event");
                Outcome::Unhandled
            } else {
                tracing::debug!(event, state = state.id(), "no transition condition satisfied");
                Outcome::Rejected
            });
        };

        let Some(target) = transition.target() else {
            run_actions(transition.actions(), &mut self.context)?;
            tracing::debug!(event, state = state.id(), "internal transition");
            return Ok(Outcome::Internal);
        };

        run_actions(state.exit_actions(), &mut self.context)?;
        run_actions(transition.actions(), &mut self.context)?;

        self.current = target;
        let next = machine.state_at(target);
        tracing::info!(event, from = state.id(), to = next.id(), "transition");
        self.listeners.notify(state, next, event);

        run_actions(next.entry_actions(), &mut self.context)?;

        Ok(Outcome::Transitioned {
            from: state.id().to_string(),
            to: next.id().to_string(),
        })
    }

    /// Picks the first candidate whose condition holds.
    fn select<'m>(
        &self,
        state: &'m State,
        event: &str,
    ) -> Result<Option<&'m Transition>, ExecutionError> {
        let candidates = state.transitions().iter().filter(|t| t.event() == event);
        for candidate in candidates {
            let satisfied = match candidate.condition() {
                Some(condition) => condition.evaluate(&self.context)?,
                None => true,
            };
            if satisfied {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    pub fn current_state(&self) -> &State {
        self.machine.state_at(self.current)
    }

    pub fn current_id(&self) -> StateId {
        self.current
    }

    pub fn is_final(&self) -> bool {
        self.current_state().is_final()
    }

    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Consumes the executor, handing back its context.
    pub fn into_context(self) -> Context {
        self.context
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("current", &self.current_state().id())
            .field("context", &self.context)
            .field("listeners", &self.listeners)
            .finish()
    }
}

fn run_actions(actions: &[ActionRef], ctx: &mut Context) -> Result<(), ExecutionError> {
    actions.iter().try_for_each(|action| action.execute(ctx))
}
