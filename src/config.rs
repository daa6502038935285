//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via --config or YASM_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub log: LogConfig,
    /// Execution configuration for `run` and `repl`.
    pub run: RunConfig,
    /// Interactive shell configuration.
    pub repl: ReplConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("YASM_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Applies overrides looked up through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.log.apply_overrides(&var);
        self.run.apply_overrides(&var);
        self.repl.apply_overrides(&var);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "log.level must not be empty".to_string(),
            ));
        }
        if self.repl.prompt.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "repl.prompt must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LogConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(level) = var("YASM_LOG_LEVEL") {
            self.level = level;
        }
    }
}

/// Execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run the initial state's entry actions before firing any event.
    pub auto_start: bool,
    /// Name given to the execution context.
    pub context_name: Option<String>,
    /// Print each action as it executes.
    pub echo_actions: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            context_name: None,
            echo_actions: true,
        }
    }
}

impl RunConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(start) = var("YASM_AUTO_START") {
            self.auto_start = parse_bool(&start);
        }
        if let Some(name) = var("YASM_CONTEXT_NAME") {
            self.context_name = (!name.is_empty()).then_some(name);
        }
        if let Some(echo) = var("YASM_ECHO_ACTIONS") {
            self.echo_actions = parse_bool(&echo);
        }
    }
}

/// Interactive shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// History file; defaults to ~/.yasm_history.
    pub history_file: Option<PathBuf>,
    /// Prompt text.
    pub prompt: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_file: None,
            prompt: "yasm>".to_string(),
        }
    }
}

impl ReplConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("YASM_HISTORY") {
            self.history_file = Some(PathBuf::from(path));
        }
        if let Some(prompt) = var("YASM_PROMPT") {
            self.prompt = prompt;
        }
    }

    /// Returns the history file path.
    pub fn history_path(&self) -> PathBuf {
        self.history_file.clone().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".yasm_history"))
                .unwrap_or_else(|_| ".yasm_history".into())
        })
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}
