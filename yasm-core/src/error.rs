//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Error raised by an embedding application's action or condition.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

/// Structural failures while reading a machine declaration.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read declaration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported declaration format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("malformed JSON declaration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML declaration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Semantic failures in an otherwise well-formed declaration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate state with id '{id}'")]
    DuplicateState { id: String },

    #[error("exactly one state must be marked initial, found {count}")]
    AmbiguousOrMissingInitialState { count: usize },

    #[error("state '{state}' cannot define transitions as it is marked final")]
    FinalStateWithTransition { state: String },

    #[error("no action found with id '{id}'")]
    UndefinedAction { id: String },

    #[error("no condition found with id '{id}'")]
    UndefinedCondition { id: String },

    #[error("no state found with id '{id}'")]
    UndefinedState { id: String },
}

impl ValidationError {
    /// Returns an error code suitable for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::DuplicateState { .. } => "DUPLICATE_STATE",
            ValidationError::AmbiguousOrMissingInitialState { .. } => "INITIAL_STATE",
            ValidationError::FinalStateWithTransition { .. } => "FINAL_STATE_TRANSITION",
            ValidationError::UndefinedAction { .. } => "UNDEFINED_ACTION",
            ValidationError::UndefinedCondition { .. } => "UNDEFINED_CONDITION",
            ValidationError::UndefinedState { .. } => "UNDEFINED_STATE",
        }
    }
}

/// Errors from compiling a declaration into a machine.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid machine: {0}")]
    Validation(#[from] ValidationError),
}

impl LoadError {
    /// Returns an error code suitable for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            LoadError::Parse(ParseError::Io { .. }) => "IO_ERROR",
            LoadError::Parse(_) => "PARSE_ERROR",
            LoadError::Validation(e) => e.error_code(),
        }
    }

    /// Returns the validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            LoadError::Validation(e) => Some(e),
            LoadError::Parse(_) => None,
        }
    }
}

/// Failures raised by capabilities while an executor runs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("action '{id}' failed: {source}")]
    Action {
        id: String,
        #[source]
        source: CapabilityError,
    },

    #[error("condition '{id}' failed: {source}")]
    Condition {
        id: String,
        #[source]
        source: CapabilityError,
    },
}

impl ExecutionError {
    /// Returns an error code suitable for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExecutionError::Action { .. } => "ACTION_FAILED",
            ExecutionError::Condition { .. } => "CONDITION_FAILED",
        }
    }

    /// Id of the capability that failed.
    pub fn capability_id(&self) -> &str {
        match self {
            ExecutionError::Action { id, .. } | ExecutionError::Condition { id, .. } => id,
        }
    }
}
