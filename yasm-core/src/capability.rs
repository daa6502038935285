//! Action and condition capabilities supplied by the embedding application.
//!
//! Implementations are registered under a caller-chosen id before a machine is
//! compiled. The compiled graph stores [`ActionRef`] and [`ConditionRef`]
//! handles, which pair the implementation with the id it was resolved from.

use crate::context::Context;
use crate::error::{CapabilityError, ExecutionError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A side-effecting operation on a [`Context`].
pub trait Action: Send + Sync {
    fn execute(&self, ctx: &mut Context) -> Result<(), CapabilityError>;
}

/// A boolean predicate over a [`Context`].
///
/// Conditions are expected to be pure; this is not enforced.
pub trait Condition: Send + Sync {
    fn evaluate(&self, ctx: &Context) -> Result<bool, CapabilityError>;
}

/// Action backed by a closure.
pub struct FnAction<F>(F);

impl<F> Action for FnAction<F>
where
    F: Fn(&mut Context) -> Result<(), CapabilityError> + Send + Sync,
{
    fn execute(&self, ctx: &mut Context) -> Result<(), CapabilityError> {
        (self.0)(ctx)
    }
}

/// Condition backed by a closure.
pub struct FnCondition<F>(F);

impl<F> Condition for FnCondition<F>
where
    F: Fn(&Context) -> Result<bool, CapabilityError> + Send + Sync,
{
    fn evaluate(&self, ctx: &Context) -> Result<bool, CapabilityError> {
        (self.0)(ctx)
    }
}

/// Wraps an infallible closure as an [`Action`].
pub fn action_fn<F>(f: F) -> FnAction<impl Fn(&mut Context) -> Result<(), CapabilityError>>
where
    F: Fn(&mut Context) + Send + Sync,
{
    FnAction(move |ctx: &mut Context| {
        f(ctx);
        Ok(())
    })
}

/// Wraps a fallible closure as an [`Action`].
pub fn try_action_fn<F>(f: F) -> FnAction<F>
where
    F: Fn(&mut Context) -> Result<(), CapabilityError> + Send + Sync,
{
    FnAction(f)
}

/// Wraps an infallible predicate as a [`Condition`].
pub fn condition_fn<F>(f: F) -> FnCondition<impl Fn(&Context) -> Result<bool, CapabilityError>>
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    FnCondition(move |ctx: &Context| Ok(f(ctx)))
}

/// Wraps a fallible predicate as a [`Condition`].
pub fn try_condition_fn<F>(f: F) -> FnCondition<F>
where
    F: Fn(&Context) -> Result<bool, CapabilityError> + Send + Sync,
{
    FnCondition(f)
}

/// Implementations keyed by id. Registering an id twice replaces the first.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers an implementation, returning the one it replaced.
    pub fn register(&mut self, id: impl Into<String>, imp: Arc<T>) -> Option<Arc<T>> {
        self.entries.insert(id.into(), imp)
    }

    /// Registers many implementations at once.
    pub fn register_all<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = (S, Arc<T>)>,
        S: Into<String>,
    {
        for (id, imp) in items {
            self.register(id, imp);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<T>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns all registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}

pub type ActionRegistry = Registry<dyn Action>;
pub type ConditionRegistry = Registry<dyn Condition>;

/// A resolved action, as stored in the machine graph.
#[derive(Clone)]
pub struct ActionRef {
    id: Arc<str>,
    action: Arc<dyn Action>,
}

impl ActionRef {
    pub fn new(id: impl Into<Arc<str>>, action: Arc<dyn Action>) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs the action, tagging any failure with its id.
    pub fn execute(&self, ctx: &mut Context) -> Result<(), ExecutionError> {
        tracing::trace!(action = %self.id, "executing action");
        self.action
            .execute(ctx)
            .map_err(|source| ExecutionError::Action {
                id: self.id.to_string(),
                source,
            })
    }
}

impl fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A resolved condition, as stored in the machine graph.
#[derive(Clone)]
pub struct ConditionRef {
    id: Arc<str>,
    condition: Arc<dyn Condition>,
}

impl ConditionRef {
    pub fn new(id: impl Into<Arc<str>>, condition: Arc<dyn Condition>) -> Self {
        Self {
            id: id.into(),
            condition,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Evaluates the condition, tagging any failure with its id.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, ExecutionError> {
        let result = self
            .condition
            .evaluate(ctx)
            .map_err(|source| ExecutionError::Condition {
                id: self.id.to_string(),
                source,
            })?;
        tracing::trace!(condition = %self.id, result, "evaluated condition");
        Ok(result)
    }
}

impl fmt::Debug for ConditionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_fn_mutates_context() {
        let action = ActionRef::new(
            "bump",
            Arc::new(action_fn(|ctx: &mut Context| {
                let n = ctx.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("n", n + 1);
            })),
        );

        let mut ctx = Context::new();
        action.execute(&mut ctx).unwrap();
        action.execute(&mut ctx).unwrap();
        assert_eq!(ctx.get("n"), Some(&json!(2)));
    }

    #[test]
    fn test_failing_action_reports_id() {
        let action = ActionRef::new(
            "charge",
            Arc::new(try_action_fn(|_ctx: &mut Context| Err("declined".into()))),
        );

        let err = action.execute(&mut Context::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::Action { ref id, .. } if id == "charge"));
    }

    #[test]
    fn test_condition_fn() {
        let condition = ConditionRef::new(
            "ready",
            Arc::new(condition_fn(|ctx: &Context| ctx.get("ready") == Some(&json!(true)))),
        );

        let mut ctx = Context::new();
        assert!(!condition.evaluate(&ctx).unwrap());
        ctx.set("ready", true);
        assert!(condition.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_failing_condition_reports_id() {
        let condition = ConditionRef::new(
            "remote",
            Arc::new(try_condition_fn(|_ctx: &Context| Err("timeout".into()))),
        );

        let err = condition.evaluate(&Context::new()).unwrap_err();
        assert_eq!(err.capability_id(), "remote");
        assert_eq!(err.error_code(), "CONDITION_FAILED");
    }

    #[test]
    fn test_registry_overwrites_by_id() {
        let mut registry = ConditionRegistry::new();
        let always: Arc<dyn Condition> = Arc::new(condition_fn(|_: &Context| true));
        let never: Arc<dyn Condition> = Arc::new(condition_fn(|_: &Context| false));

        assert!(registry.register("gate", always).is_none());
        assert!(registry.register("gate", never).is_some());
        assert_eq!(registry.len(), 1);

        let gate = registry.get("gate").unwrap();
        assert!(!gate.evaluate(&Context::new()).unwrap());
    }

    #[test]
    fn test_registry_ids_sorted() {
        let mut registry = ActionRegistry::new();
        let noop: Arc<dyn Action> = Arc::new(action_fn(|_: &mut Context| {}));
        registry.register_all([("zeta", noop.clone()), ("alpha", noop)]);

        assert_eq!(registry.ids(), vec!["alpha", "zeta"]);
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("beta"));
    }
}
