//! Stand-in capabilities for running declarations from the command line.
//!
//! Every action id a document references is bound to [`TraceAction`], and
//! every condition id to [`FlagCondition`], so any well-formed declaration can
//! be driven interactively without application code.

use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use yasm_core::{
    Action, ActionRegistry, CapabilityError, Condition, ConditionRegistry, Context,
    MachineDocument,
};

/// Context key holding the ids of executed actions, oldest first.
pub const TRACE_KEY: &str = "trace";

/// Records its id in the context's trace and optionally echoes it.
pub struct TraceAction {
    id: String,
    echo: bool,
}

impl TraceAction {
    pub fn new(id: impl Into<String>, echo: bool) -> Self {
        Self {
            id: id.into(),
            echo,
        }
    }
}

impl Action for TraceAction {
    fn execute(&self, ctx: &mut Context) -> Result<(), CapabilityError> {
        tracing::info!(action = %self.id, "exec");
        if self.echo {
            println!("  {} {}", "exec".dimmed(), self.id.cyan());
        }

        let mut trace = match ctx.remove(TRACE_KEY) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        trace.push(Value::String(self.id.clone()));
        ctx.set(TRACE_KEY, Value::Array(trace));
        Ok(())
    }
}

/// Holds when the context variable named by its id is truthy.
pub struct FlagCondition {
    key: String,
}

impl FlagCondition {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Condition for FlagCondition {
    fn evaluate(&self, ctx: &Context) -> Result<bool, CapabilityError> {
        Ok(ctx.get(&self.key).map(is_truthy).unwrap_or(false))
    }
}

/// Builds registries covering every id the document references.
pub fn registries(document: &MachineDocument, echo: bool) -> (ActionRegistry, ConditionRegistry) {
    let mut actions = ActionRegistry::new();
    for id in document.action_ids() {
        actions.register(id, Arc::new(TraceAction::new(id, echo)));
    }

    let mut conditions = ConditionRegistry::new();
    for id in document.condition_ids() {
        conditions.register(id, Arc::new(FlagCondition::new(id)));
    }

    (actions, conditions)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
