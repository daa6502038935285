//! Interactive REPL.

use crate::commands::{self, describe_outcome, format_context, parse_assignment};
use crate::config::Config;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use yasm_core::{Executor, State};

const HELP_TEXT: &str = r#"
Available commands:
  help                    Show this help

  fire <event>...         Fire one or more events in order
  state                   Show the current state and its events
  reset                   Return to the initial state without running actions
  start                   Run the current state's entry actions

  set <key>=<json>        Set a context variable
  get <key>               Show a context variable
  ctx                     Show the whole context

  quit, exit              Exit the REPL
"#;

pub fn run(path: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "yasm REPL".bold().cyan());

    let machine = Arc::new(commands::compile(path, config.run.echo_actions)?);
    println!(
        "Loaded {} ({} states, initial: {})",
        path.display().to_string().cyan(),
        machine.len(),
        machine.initial().id().yellow()
    );

    let mut executor = commands::executor(machine, &config.run)?;
    executor.add_listener(Arc::new(|from: &State, to: &State, event: &str| {
        tracing::debug!(from = from.id(), to = to.id(), event, "repl transition");
    }));

    // Create readline editor
    let rl_config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = config.repl.history_path();
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", config.repl.prompt.cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut executor, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn execute_repl_command(
    executor: &mut Executor,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "fire" | "f" => {
            if args.is_empty() {
                return Ok(Some("Usage: fire <event>...".to_string()));
            }
            let mut lines = Vec::with_capacity(args.len());
            for event in args {
                let outcome = executor.fire(event)?;
                lines.push(describe_outcome(event, &outcome));
            }
            Ok(Some(lines.join("\n")))
        }

        "state" | "s" => {
            let state = executor.current_state();
            let mut seen = HashSet::new();
            let events: Vec<&str> = state
                .transitions()
                .iter()
                .map(|t| t.event())
                .filter(|event| seen.insert(*event))
                .collect();
            let marker = if state.is_final() { " [final]" } else { "" };
            Ok(Some(format!(
                "{}{}\n  events: {}",
                state.id().yellow(),
                marker,
                if events.is_empty() {
                    "-".to_string()
                } else {
                    events.join(", ")
                }
            )))
        }

        "reset" => {
            executor.reset();
            Ok(Some(format!(
                "{} {}",
                "Reset to".green(),
                executor.current_state().id().yellow()
            )))
        }

        "start" => {
            executor.start()?;
            Ok(Some(format!(
                "{} {}",
                "Started".green(),
                executor.current_state().id().yellow()
            )))
        }

        "set" => {
            if args.is_empty() {
                return Ok(Some("Usage: set <key>=<json>".to_string()));
            }
            let (key, value) = parse_assignment(&args.join(" "))?;
            executor.context_mut().set(key.clone(), value);
            Ok(Some(format!("{} {}", "Set".green(), key.cyan())))
        }

        "get" | "g" => {
            if args.is_empty() {
                return Ok(Some("Usage: get <key>".to_string()));
            }
            match executor.context().get(args[0]) {
                Some(value) => Ok(Some(value.to_string())),
                None => Ok(Some(format!("{} is not set", args[0]).yellow().to_string())),
            }
        }

        "ctx" | "c" => Ok(Some(format_context(executor.context()))),

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}
