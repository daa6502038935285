//! Compiles declarations into machines.
//!
//! Compilation runs in two passes over a parsed [`MachineDocument`]:
//!
//! 1. A linear scan in document order creates every state, resolving entry,
//!    exit and transition actions and transition conditions against the
//!    registries as they are met. Transitions are buffered, because their
//!    targets may name states declared further down.
//! 2. Once all states are known the single initial state is checked, then
//!    each buffered transition has its target resolved and is attached to its
//!    origin, in declaration order.
//!
//! Any failure aborts compilation; no partial machine is ever returned.

use crate::capability::{
    Action, ActionRef, ActionRegistry, Condition, ConditionRef, ConditionRegistry,
};
use crate::definition::{Machine, MachineBuilder, StateId, Transition};
use crate::document::{ActionDecl, DocumentFormat, MachineDocument, Source};
use crate::error::{LoadError, ValidationError};
use std::path::PathBuf;
use std::sync::Arc;

/// Single-use compiler from a declaration source to a [`Machine`].
#[derive(Debug)]
pub struct Loader {
    source: Source,
    actions: ActionRegistry,
    conditions: ConditionRegistry,
}

impl Loader {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            actions: ActionRegistry::new(),
            conditions: ConditionRegistry::new(),
        }
    }

    /// Loader for a declaration file; the format follows the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Source::path(path))
    }

    /// Loader for a declaration held in memory.
    pub fn inline(text: impl Into<String>, format: DocumentFormat) -> Self {
        Self::new(Source::inline(text, format))
    }

    /// Replaces both registries wholesale.
    pub fn with_registries(
        mut self,
        actions: ActionRegistry,
        conditions: ConditionRegistry,
    ) -> Self {
        self.actions = actions;
        self.conditions = conditions;
        self
    }

    /// Registers an action under `id`, replacing any earlier registration.
    pub fn register_action<A>(&mut self, id: impl Into<String>, action: A) -> &mut Self
    where
        A: Action + 'static,
    {
        self.actions.register(id, Arc::new(action));
        self
    }

    /// Registers a condition under `id`, replacing any earlier registration.
    pub fn register_condition<C>(&mut self, id: impl Into<String>, condition: C) -> &mut Self
    where
        C: Condition + 'static,
    {
        self.conditions.register(id, Arc::new(condition));
        self
    }

    pub fn register_actions<I, S>(&mut self, actions: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Action>)>,
        S: Into<String>,
    {
        self.actions.register_all(actions);
        self
    }

    pub fn register_conditions<I, S>(&mut self, conditions: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Condition>)>,
        S: Into<String>,
    {
        self.conditions.register_all(conditions);
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Reads the source and compiles it.
    pub fn compile(self) -> Result<Machine, LoadError> {
        tracing::debug!(source = %self.source, "compiling machine");
        let document = self.source.read()?;
        let machine = compile_document(&document, &self.actions, &self.conditions)?;
        tracing::debug!(
            source = %self.source,
            states = machine.len(),
            transitions = machine.transition_count(),
            "compiled machine"
        );
        Ok(machine)
    }
}

/// A transition seen during the scan, waiting for its target to resolve.
struct PendingTransition<'d> {
    origin: StateId,
    event: &'d str,
    target: Option<&'d str>,
    condition: Option<ConditionRef>,
    actions: Vec<ActionRef>,
}

/// Validates a parsed document against the registries and builds the machine.
pub fn compile_document(
    document: &MachineDocument,
    actions: &ActionRegistry,
    conditions: &ConditionRegistry,
) -> Result<Machine, ValidationError> {
    let mut builder = MachineBuilder::new();
    let mut pending = Vec::new();

    // Pass 1: states, actions and conditions, in document order.
    for decl in &document.states {
        let state = builder.add_state(decl.id.as_str(), decl.is_initial, decl.is_final)?;

        for action in &decl.entry {
            builder.add_entry_action(state, resolve_action(actions, action)?);
        }
        for action in &decl.exit {
            builder.add_exit_action(state, resolve_action(actions, action)?);
        }

        for t in &decl.transitions {
            if decl.is_final {
                return Err(ValidationError::FinalStateWithTransition {
                    state: decl.id.clone(),
                });
            }

            let condition = t
                .condition
                .as_deref()
                .map(|id| resolve_condition(conditions, id))
                .transpose()?;
            let resolved = t
                .actions
                .iter()
                .map(|a| resolve_action(actions, a))
                .collect::<Result<Vec<_>, _>>()?;

            pending.push(PendingTransition {
                origin: state,
                event: &t.event,
                target: t.target.as_deref(),
                condition,
                actions: resolved,
            });
        }
    }

    // Pass 2: whole-machine checks, then forward references.
    builder.initial_state()?;

    for p in pending {
        let target = p
            .target
            .map(|id| {
                builder
                    .state_id(id)
                    .ok_or_else(|| ValidationError::UndefinedState { id: id.to_string() })
            })
            .transpose()?;
        builder.add_transition(
            p.origin,
            Transition::new(p.event, target, p.condition, p.actions),
        )?;
    }

    builder.finalize()
}

fn resolve_action(
    registry: &ActionRegistry,
    decl: &ActionDecl,
) -> Result<ActionRef, ValidationError> {
    registry
        .get(&decl.exec)
        .map(|action| ActionRef::new(decl.exec.as_str(), action.clone()))
        .ok_or_else(|| ValidationError::UndefinedAction {
            id: decl.exec.clone(),
        })
}

fn resolve_condition(
    registry: &ConditionRegistry,
    id: &str,
) -> Result<ConditionRef, ValidationError> {
    registry
        .get(id)
        .map(|condition| ConditionRef::new(id, condition.clone()))
        .ok_or_else(|| ValidationError::UndefinedCondition { id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{action_fn, condition_fn};
    use crate::context::Context;
    use crate::document::{ActionDecl, StateDecl, TransitionDecl};
    use crate::error::ParseError;
    use proptest::prelude::*;
    use std::io::Write;

    const SCENARIO: &str = r#"
states:
  - id: A
    initial: true
    transitions:
      - event: go
        target: B
        actions: [logMove]
  - id: B
    transitions:
      - event: finish
        target: C
        condition: always
  - id: C
    final: true
"#;

    fn loader(yaml: &str) -> Loader {
        let mut loader = Loader::inline(yaml, DocumentFormat::Yaml);
        loader
            .register_action("logMove", action_fn(|_: &mut Context| {}))
            .register_condition("always", condition_fn(|_: &Context| true));
        loader
    }

    fn validation_error(yaml: &str) -> ValidationError {
        match loader(yaml).compile() {
            Err(LoadError::Validation(e)) => e,
            other => panic!("expected validation error, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_compile_scenario() {
        let machine = loader(SCENARIO).compile().unwrap();

        assert_eq!(machine.len(), 3);
        assert_eq!(machine.initial().id(), "A");
        assert_eq!(machine.states().filter(|s| s.is_initial()).count(), 1);
        assert!(machine.state("C").unwrap().is_final());

        let go = &machine.state("A").unwrap().transitions()[0];
        assert_eq!(go.event(), "go");
        assert_eq!(machine.state_at(go.target().unwrap()).id(), "B");
        assert_eq!(go.actions()[0].id(), "logMove");

        let finish = &machine.state("B").unwrap().transitions()[0];
        assert_eq!(finish.condition().unwrap().id(), "always");
        assert_eq!(machine.state_at(finish.target().unwrap()).id(), "C");
    }

    #[test]
    fn test_forward_reference() {
        let machine = loader(
            r#"
states:
  - id: A
    initial: true
    transitions:
      - event: jump
        target: Later
  - id: Later
"#,
        )
        .compile()
        .unwrap();

        let t = &machine.initial().transitions()[0];
        assert_eq!(machine.state_at(t.target().unwrap()).id(), "Later");
    }

    #[test]
    fn test_undefined_target() {
        let err = validation_error(
            r#"
states:
  - id: A
    initial: true
    transitions:
      - event: go
        target: Z
"#,
        );
        assert_eq!(err, ValidationError::UndefinedState { id: "Z".into() });
    }

    #[test]
    fn test_duplicate_state() {
        let err = validation_error(
            r#"
states:
  - id: A
    initial: true
  - id: A
"#,
        );
        assert_eq!(err, ValidationError::DuplicateState { id: "A".into() });
    }

    #[test]
    fn test_missing_initial_state() {
        let err = validation_error("states:\n  - id: A\n  - id: B\n");
        assert_eq!(
            err,
            ValidationError::AmbiguousOrMissingInitialState { count: 0 }
        );

        let err = validation_error("states: []\n");
        assert_eq!(
            err,
            ValidationError::AmbiguousOrMissingInitialState { count: 0 }
        );
    }

    #[test]
    fn test_ambiguous_initial_state() {
        let err = validation_error(
            "states:\n  - id: A\n    initial: true\n  - id: B\n    initial: true\n",
        );
        assert_eq!(
            err,
            ValidationError::AmbiguousOrMissingInitialState { count: 2 }
        );
    }

    #[test]
    fn test_final_state_with_transition() {
        let err = validation_error(
            r#"
states:
  - id: A
    initial: true
    final: true
    transitions:
      - event: go
"#,
        );
        assert_eq!(
            err,
            ValidationError::FinalStateWithTransition { state: "A".into() }
        );
    }

    #[test]
    fn test_undefined_actions() {
        let entry = validation_error("states:\n  - id: A\n    initial: true\n    entry: [nope]\n");
        assert_eq!(entry, ValidationError::UndefinedAction { id: "nope".into() });

        let exit = validation_error("states:\n  - id: A\n    initial: true\n    exit: [gone]\n");
        assert_eq!(exit, ValidationError::UndefinedAction { id: "gone".into() });

        let inline = validation_error(
            r#"
states:
  - id: A
    initial: true
    transitions:
      - event: go
        actions: [logMove, missing]
"#,
        );
        assert_eq!(
            inline,
            ValidationError::UndefinedAction {
                id: "missing".into()
            }
        );
    }

    #[test]
    fn test_numeric_action_ids_resolve() {
        let mut loader = loader(
            r#"
states:
  - id: A
    initial: true
    entry: [2, {exec: 2}]
"#,
        );
        loader.register_action("2", action_fn(|_: &mut Context| {}));

        let machine = loader.compile().unwrap();
        let ids: Vec<&str> = machine
            .initial()
            .entry_actions()
            .iter()
            .map(ActionRef::id)
            .collect();
        assert_eq!(ids, vec!["2", "2"]);
    }

    #[test]
    fn test_undefined_condition() {
        let err = validation_error(
            r#"
states:
  - id: A
    initial: true
    transitions:
      - event: go
        condition: unknown
"#,
        );
        assert_eq!(
            err,
            ValidationError::UndefinedCondition {
                id: "unknown".into()
            }
        );
    }

    #[test]
    fn test_scan_errors_follow_document_order() {
        // The undefined action in A is met before the duplicate B.
        let err = validation_error(
            r#"
states:
  - id: A
    initial: true
    entry: [missing]
  - id: B
  - id: B
"#,
        );
        assert_eq!(
            err,
            ValidationError::UndefinedAction {
                id: "missing".into()
            }
        );
    }

    #[test]
    fn test_initial_check_precedes_target_resolution() {
        let err = validation_error(
            r#"
states:
  - id: A
    transitions:
      - event: go
        target: Z
"#,
        );
        assert_eq!(
            err,
            ValidationError::AmbiguousOrMissingInitialState { count: 0 }
        );
    }

    #[test]
    fn test_mixed_transitions_keep_declaration_order() {
        let mut loader = loader(
            r#"
states:
  - id: A
    initial: true
    transitions:
      - {event: e, target: B, actions: [t0]}
      - {event: e, actions: [t1]}
      - {event: f, target: A, actions: [t2]}
      - {event: e, actions: [t3]}
      - {event: e, target: B, actions: [t4]}
  - id: B
"#,
        );
        for id in ["t0", "t1", "t2", "t3", "t4"] {
            loader.register_action(id, action_fn(|_: &mut Context| {}));
        }

        let machine = loader.compile().unwrap();
        let order: Vec<&str> = machine
            .initial()
            .transitions()
            .iter()
            .map(|t| t.actions()[0].id())
            .collect();
        assert_eq!(order, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn test_later_registration_wins() {
        let mut loader = loader(SCENARIO);
        loader.register_action(
            "logMove",
            action_fn(|ctx: &mut Context| {
                ctx.set("replaced", true);
            }),
        );

        let machine = loader.compile().unwrap();
        let mut ctx = Context::new();
        machine.initial().transitions()[0].actions()[0]
            .execute(&mut ctx)
            .unwrap();
        assert_eq!(ctx.get("replaced"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_parse_error_is_distinct() {
        let result = loader("states: [").compile();
        assert!(matches!(result, Err(LoadError::Parse(ParseError::Yaml(_)))));
    }

    #[test]
    fn test_compile_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let mut loader = Loader::from_path(file.path());
        loader
            .register_action("logMove", action_fn(|_: &mut Context| {}))
            .register_condition("always", condition_fn(|_: &Context| true));

        assert_eq!(loader.compile().unwrap().len(), 3);
    }

    #[test]
    fn test_compile_unreadable_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = Loader::from_path(dir.path().join("missing.yaml")).compile();
        assert!(matches!(result, Err(LoadError::Parse(ParseError::Io { .. }))));
    }

    fn ordered_document(targets: &[Option<bool>]) -> MachineDocument {
        let transitions = targets
            .iter()
            .enumerate()
            .map(|(i, target)| TransitionDecl {
                event: if i % 2 == 0 { "even" } else { "odd" }.to_string(),
                target: target.map(|to_b| if to_b { "B" } else { "A" }.to_string()),
                condition: None,
                actions: vec![ActionDecl::new(format!("t{}", i))],
            })
            .collect();

        MachineDocument {
            states: vec![
                StateDecl {
                    id: "A".into(),
                    is_initial: true,
                    is_final: false,
                    entry: vec![],
                    exit: vec![],
                    transitions,
                },
                StateDecl {
                    id: "B".into(),
                    is_initial: false,
                    is_final: false,
                    entry: vec![],
                    exit: vec![],
                    transitions: vec![],
                },
            ],
        }
    }

    proptest! {
        #[test]
        fn prop_declaration_order_preserved(
            targets in prop::collection::vec(prop::option::of(any::<bool>()), 0..24)
        ) {
            let document = ordered_document(&targets);
            let mut actions = ActionRegistry::new();
            for i in 0..targets.len() {
                actions.register(format!("t{}", i), Arc::new(action_fn(|_: &mut Context| {})));
            }

            let machine = compile_document(&document, &actions, &ConditionRegistry::new()).unwrap();
            let compiled: Vec<String> = machine
                .initial()
                .transitions()
                .iter()
                .map(|t| t.actions()[0].id().to_string())
                .collect();
            let expected: Vec<String> = (0..targets.len()).map(|i| format!("t{}", i)).collect();
            prop_assert_eq!(compiled, expected);

            for (t, target) in machine.initial().transitions().iter().zip(&targets) {
                prop_assert_eq!(t.is_internal(), target.is_none());
            }
        }
    }
}
