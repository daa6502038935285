//! State machine definition types.
//!
//! A [`Machine`] is an immutable graph of [`State`]s. Each state owns its
//! ordered entry and exit actions and its outgoing [`Transition`]s; transition
//! targets are [`StateId`] indices into the machine's state table, so the
//! graph never holds references into itself.
//!
//! Machines are assembled through a [`MachineBuilder`], which only allows
//! appending, and are frozen by [`MachineBuilder::finalize`].

use crate::capability::{ActionRef, ConditionRef};
use crate::error::ValidationError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Index of a state within its machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An event-triggered edge out of a state.
///
/// A transition without a target is internal: it runs its actions but never
/// leaves the current state.
#[derive(Clone)]
pub struct Transition {
    event: String,
    target: Option<StateId>,
    condition: Option<ConditionRef>,
    actions: Vec<ActionRef>,
}

impl Transition {
    pub fn new(
        event: impl Into<String>,
        target: Option<StateId>,
        condition: Option<ConditionRef>,
        actions: Vec<ActionRef>,
    ) -> Self {
        Self {
            event: event.into(),
            target,
            condition,
            actions,
        }
    }

    /// Event that triggers this transition.
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn target(&self) -> Option<StateId> {
        self.target
    }

    pub fn condition(&self) -> Option<&ConditionRef> {
        self.condition.as_ref()
    }

    pub fn actions(&self) -> &[ActionRef] {
        &self.actions
    }

    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("target", &self.target.map(StateId::index))
            .field("condition", &self.condition)
            .field("actions", &self.actions)
            .finish()
    }
}

/// A named node of the machine.
#[derive(Debug, Clone)]
pub struct State {
    id: String,
    is_initial: bool,
    is_final: bool,
    entry_actions: Vec<ActionRef>,
    exit_actions: Vec<ActionRef>,
    transitions: Vec<Transition>,
}

impl State {
    fn new(id: String, is_initial: bool, is_final: bool) -> Self {
        Self {
            id,
            is_initial,
            is_final,
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Final states never carry transitions.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn entry_actions(&self) -> &[ActionRef] {
        &self.entry_actions
    }

    pub fn exit_actions(&self) -> &[ActionRef] {
        &self.exit_actions
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the transitions triggered by `event`, in declaration order.
    pub fn transitions_for<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.event == event)
    }
}

/// Validated, immutable machine definition.
///
/// Safe to share read-only across threads, typically as `Arc<Machine>`.
#[derive(Debug)]
pub struct Machine {
    states: Vec<State>,
    index: HashMap<String, StateId>,
    initial: StateId,
}

impl Machine {
    pub fn initial(&self) -> &State {
        &self.states[self.initial.0]
    }

    pub fn initial_id(&self) -> StateId {
        self.initial
    }

    /// Looks up a state by its declared id.
    pub fn state(&self, id: &str) -> Option<&State> {
        self.index.get(id).map(|sid| &self.states[sid.0])
    }

    pub fn state_id(&self, id: &str) -> Option<StateId> {
        self.index.get(id).copied()
    }

    /// Returns the state at `id`.
    ///
    /// Ids are only ever minted by this machine's builder, so every id a
    /// caller obtained from this machine is in range.
    pub fn state_at(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    /// All states in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Distinct event names used anywhere in the machine, sorted.
    pub fn events(&self) -> Vec<&str> {
        self.states
            .iter()
            .flat_map(|s| s.transitions.iter().map(Transition::event))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Total number of transitions across all states.
    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len()).sum()
    }
}

/// Append-only assembly of a [`Machine`].
#[derive(Debug, Default)]
pub struct MachineBuilder {
    states: Vec<State>,
    index: HashMap<String, StateId>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state, rejecting ids that are already taken.
    pub fn add_state(
        &mut self,
        id: impl Into<String>,
        is_initial: bool,
        is_final: bool,
    ) -> Result<StateId, ValidationError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(ValidationError::DuplicateState { id });
        }

        let sid = StateId(self.states.len());
        self.index.insert(id.clone(), sid);
        self.states.push(State::new(id, is_initial, is_final));
        Ok(sid)
    }

    pub fn add_entry_action(&mut self, state: StateId, action: ActionRef) {
        self.states[state.0].entry_actions.push(action);
    }

    pub fn add_exit_action(&mut self, state: StateId, action: ActionRef) {
        self.states[state.0].exit_actions.push(action);
    }

    /// Appends a transition to `origin`.
    ///
    /// Final states reject transitions; the target, if any, must be a state
    /// already added to this builder.
    pub fn add_transition(
        &mut self,
        origin: StateId,
        transition: Transition,
    ) -> Result<(), ValidationError> {
        let state = &self.states[origin.0];
        if state.is_final {
            return Err(ValidationError::FinalStateWithTransition {
                state: state.id.clone(),
            });
        }
        if let Some(target) = transition.target {
            if target.0 >= self.states.len() {
                return Err(ValidationError::UndefinedState {
                    id: format!("#{}", target.0),
                });
            }
        }

        self.states[origin.0].transitions.push(transition);
        Ok(())
    }

    pub fn state_id(&self, id: &str) -> Option<StateId> {
        self.index.get(id).copied()
    }

    /// Returns the single initial state.
    pub fn initial_state(&self) -> Result<StateId, ValidationError> {
        let mut initial = self.states.iter().enumerate().filter(|(_, s)| s.is_initial);
        match (initial.next(), initial.next()) {
            (Some((i, _)), None) => Ok(StateId(i)),
            (None, _) => Err(ValidationError::AmbiguousOrMissingInitialState { count: 0 }),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousOrMissingInitialState {
                count: self.states.iter().filter(|s| s.is_initial).count(),
            }),
        }
    }

    /// Freezes the builder into a machine.
    pub fn finalize(self) -> Result<Machine, ValidationError> {
        let initial = self.initial_state()?;
        Ok(Machine {
            states: self.states,
            index: self.index,
            initial,
        })
    }
}
