//! yasm - declarative state machines from the command line
//!
//! Validates, inspects and drives machine declarations, either one-shot or
//! from an interactive REPL.

mod bindings;
mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "yasm")]
#[command(about = "Validate, inspect and run declarative state machines")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "YASM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a declaration and print a summary
    Check {
        /// Declaration file (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// Print the states and transitions of a declaration
    Inspect {
        /// Declaration file (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// Fire events against a fresh executor
    Run {
        /// Declaration file (.json, .yaml or .yml)
        file: PathBuf,

        /// Event to fire; repeat to fire several in order
        #[arg(short, long = "event")]
        events: Vec<String>,

        /// Context variable as key=json; repeat for several
        #[arg(long = "set", value_parser = commands::parse_assignment)]
        assignments: Vec<(String, Value)>,
    },

    /// Start an interactive REPL over a declaration
    Repl {
        /// Declaration file (.json, .yaml or .yml)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = execute(cli.command, &config) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn execute(command: Commands, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Check { file } => {
            println!("{}", commands::check(&file)?);
        }
        Commands::Inspect { file } => {
            print!("{}", commands::inspect(&file)?);
        }
        Commands::Run {
            file,
            events,
            assignments,
        } => {
            let stdout = std::io::stdout();
            commands::run(&file, &events, &assignments, &config.run, &mut stdout.lock())?;
        }
        Commands::Repl { file } => {
            repl::run(&file, config)?;
        }
    }
    Ok(())
}
