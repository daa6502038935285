//! Command execution.

use crate::bindings;
use crate::config::RunConfig;
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use yasm_core::{
    compile_document, ActionRef, Context, ExecutionError, Executor, LoadError, Machine, Outcome,
    Source, TransitionLog,
};

/// Reads the declaration at `path` and compiles it against stand-in capabilities.
pub fn compile(path: &Path, echo: bool) -> Result<Machine, LoadError> {
    let document = Source::path(path).read()?;
    let (actions, conditions) = bindings::registries(&document, echo);
    let machine = compile_document(&document, &actions, &conditions)?;
    tracing::debug!(
        path = %path.display(),
        states = machine.len(),
        transitions = machine.transition_count(),
        "compiled machine"
    );
    Ok(machine)
}

/// Creates an executor as configured, running initial entry actions when `auto_start` is set.
pub fn executor(machine: Arc<Machine>, config: &RunConfig) -> Result<Executor, ExecutionError> {
    let context = match &config.context_name {
        Some(name) => Context::named(name.clone()),
        None => Context::new(),
    };
    let mut executor = Executor::new(machine, context);
    if config.auto_start {
        executor.start()?;
    }
    Ok(executor)
}

/// `check <file>`
pub fn check(path: &Path) -> Result<String, LoadError> {
    let machine = compile(path, false)?;
    Ok(format!(
        "{} {} ({} states, {} transitions, initial: {})",
        "OK".green(),
        path.display().to_string().cyan(),
        machine.len(),
        machine.transition_count(),
        machine.initial().id().yellow()
    ))
}

/// `inspect <file>`
pub fn inspect(path: &Path) -> Result<String, LoadError> {
    let machine = compile(path, false)?;
    Ok(describe_machine(&machine))
}

/// `run <file> -e <event>...`
///
/// Writes one line per event, then the resulting state and context.
pub fn run(
    path: &Path,
    events: &[String],
    assignments: &[(String, Value)],
    config: &RunConfig,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let machine = Arc::new(compile(path, config.echo_actions)?);

    let deferred = RunConfig {
        auto_start: false,
        ..config.clone()
    };
    let mut executor = executor(machine, &deferred)?;
    for (key, value) in assignments {
        executor.context_mut().set(key.clone(), value.clone());
    }
    if config.auto_start {
        executor.start()?;
    }

    let log = Arc::new(TransitionLog::new());
    executor.add_listener(log.clone());

    for event in events {
        let outcome = executor.fire(event)?;
        writeln!(out, "{}", describe_outcome(event, &outcome))?;
    }

    writeln!(
        out,
        "{} {} after {} transition(s)",
        "State:".bold(),
        executor.current_state().id().yellow(),
        log.len()
    )?;
    writeln!(out, "{} {}", "Context:".bold(), format_context(executor.context()))?;
    Ok(())
}

/// Parses a `key=json` assignment; values that are not valid JSON are taken as strings.
pub fn parse_assignment(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

pub fn describe_outcome(event: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Transitioned { from, to } => {
            format!("{} {} → {}", event.cyan(), from, to.yellow())
        }
        Outcome::Internal => format!("{} {}", event.cyan(), "(internal)".dimmed()),
        Outcome::Rejected => format!("{} {}", event.cyan(), "rejected by conditions".yellow()),
        Outcome::Unhandled => format!("{} {}", event.cyan(), "not handled".yellow()),
        Outcome::Final => format!("{} {}", event.cyan(), "ignored in final state".dimmed()),
    }
}

pub fn describe_machine(machine: &Machine) -> String {
    let mut output = String::new();
    for state in machine.states() {
        let mut flags = Vec::new();
        if state.is_initial() {
            flags.push("initial");
        }
        if state.is_final() {
            flags.push("final");
        }
        if flags.is_empty() {
            output.push_str(&format!("{}\n", state.id().cyan().bold()));
        } else {
            output.push_str(&format!(
                "{} [{}]\n",
                state.id().cyan().bold(),
                flags.join(", ")
            ));
        }

        if !state.entry_actions().is_empty() {
            output.push_str(&format!("  entry: {}\n", join_ids(state.entry_actions())));
        }
        if !state.exit_actions().is_empty() {
            output.push_str(&format!("  exit: {}\n", join_ids(state.exit_actions())));
        }
        for transition in state.transitions() {
            let target = match transition.target() {
                Some(id) => machine.state_at(id).id().yellow().to_string(),
                None => "(internal)".dimmed().to_string(),
            };
            output.push_str(&format!("  on {} → {}", transition.event().green(), target));
            if let Some(condition) = transition.condition() {
                output.push_str(&format!(" if {}", condition.id()));
            }
            if !transition.actions().is_empty() {
                output.push_str(&format!(" do {}", join_ids(transition.actions())));
            }
            output.push('\n');
        }
    }
    output
}

/// Renders the context's variables as a JSON object with sorted keys.
pub fn format_context(ctx: &Context) -> String {
    let map: serde_json::Map<String, Value> = ctx
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    let value = Value::Object(map);
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

fn join_ids(actions: &[ActionRef]) -> String {
    actions
        .iter()
        .map(ActionRef::id)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const ORDER: &str = r#"
states:
  - id: cart
    initial: true
    entry: [open_cart]
    transitions:
      - {event: add, actions: [add_item]}
      - {event: checkout, target: paid, condition: has_card, actions: [charge]}
  - id: paid
    exit: [receipt]
    transitions:
      - {event: ship, target: shipped}
  - id: shipped
    final: true
"#;

    fn write_doc(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn quiet() -> RunConfig {
        RunConfig {
            echo_actions: false,
            ..RunConfig::default()
        }
    }

    fn into_text(output: Vec<u8>) -> String {
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_check_summary() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "order.yaml", ORDER);
        let summary = check(&path).unwrap();
        assert!(summary.contains("3 states, 3 transitions, initial: cart"));
    }

    #[test]
    fn test_check_reports_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(
            &dir,
            "bad.json",
            r#"{"states": [
                {"id": "A", "initial": true, "transitions": [{"event": "go", "target": "Z"}]}
            ]}"#,
        );
        let err = check(&path).unwrap_err();
        assert_eq!(err.error_code(), "UNDEFINED_STATE");
    }

    #[test]
    fn test_inspect_lists_structure() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "order.yml", ORDER);
        let text = inspect(&path).unwrap();

        assert!(text.contains("cart [initial]"));
        assert!(text.contains("  entry: open_cart"));
        assert!(text.contains("  on add → (internal) do add_item"));
        assert!(text.contains("  on checkout → paid if has_card do charge"));
        assert!(text.contains("  exit: receipt"));
        assert!(text.contains("shipped [final]"));
    }

    #[test]
    fn test_run_sequence() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "order.yaml", ORDER);
        let events: Vec<String> = ["add", "checkout", "ship", "ship"]
            .into_iter()
            .map(String::from)
            .collect();
        let assignments = vec![("has_card".to_string(), json!(true))];

        let mut out = Vec::new();
        run(&path, &events, &assignments, &quiet(), &mut out).unwrap();
        let text = into_text(out);

        assert!(text.contains("add (internal)"));
        assert!(text.contains("checkout cart → paid"));
        assert!(text.contains("ship paid → shipped"));
        assert!(text.contains("ship ignored in final state"));
        assert!(text.contains("State: shipped after 2 transition(s)"));
        assert!(text.contains(r#""open_cart""#));
        assert!(text.contains(r#""receipt""#));
    }

    #[test]
    fn test_run_rejected_without_flag() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "order.yaml", ORDER);
        let events = vec!["checkout".to_string(), "ship".to_string()];

        let mut out = Vec::new();
        run(&path, &events, &[], &quiet(), &mut out).unwrap();
        let text = into_text(out);

        assert!(text.contains("checkout rejected by conditions"));
        assert!(text.contains("ship not handled"));
        assert!(text.contains("State: cart after 0 transition(s)"));
    }

    #[test]
    fn test_executor_respects_auto_start() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "order.yaml", ORDER);
        let machine = Arc::new(compile(&path, false).unwrap());

        let started = executor(machine.clone(), &quiet()).unwrap();
        assert_eq!(started.context().get("trace"), Some(&json!(["open_cart"])));

        let config = RunConfig {
            auto_start: false,
            context_name: Some("order".into()),
            echo_actions: false,
        };
        let idle = executor(machine, &config).unwrap();
        assert!(idle.context().is_empty());
        assert_eq!(idle.context().name(), Some("order"));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("n=3").unwrap(),
            ("n".to_string(), json!(3))
        );
        assert_eq!(
            parse_assignment("tags=[\"a\"]").unwrap(),
            ("tags".to_string(), json!(["a"]))
        );
        assert_eq!(
            parse_assignment("who=alice").unwrap(),
            ("who".to_string(), json!("alice"))
        );
        assert_eq!(
            parse_assignment("eq=a=b").unwrap(),
            ("eq".to_string(), json!("a=b"))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=1").is_err());
    }
}
