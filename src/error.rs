//! Error types for bleep
//!
//! Domain-specific error types using thiserror.
//!
//! Errors here describe *why* something could not be read, planned or run.
//! Inside a scheduling run they are turned into module-scoped
//! [`FailureReason`](crate::core::state::FailureReason) values and never abort
//! the run as a whole.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Manifest and bundler config errors (module excluded, siblings unaffected)
#[derive(Error, Debug)]
pub enum ManifestError {
    /// File exists but could not be read
    #[error("Failed to read '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// File content is malformed
    #[error("Failed to parse '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A bundle target is missing a required key
    #[error("Bundle target '{target}' in '{path}' is missing '{field}'")]
    MissingField {
        path: PathBuf,
        target: String,
        field: String,
    },
}

/// Build script planning errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Quote opened but never closed
    #[error("Unterminated {quote} quote in script '{script}'")]
    UnterminatedQuote { script: String, quote: char },

    /// Separator with nothing on one side (`a && && b`)
    #[error("Empty command in script '{script}'")]
    EmptyCommand { script: String },
}

/// Dependency graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Workspace root does not exist
    #[error("Workspace root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// Walking the module tree failed
    #[error("Failed to walk '{path}': {error}")]
    Walk { path: PathBuf, error: String },

    /// Circular dependency detected
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Module not present in the graph
    #[error("Unknown module '{name}'")]
    UnknownModule { name: String },
}

/// Build errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildError {
    /// Invocation exited with a non-zero status
    #[error("'{command}' exited with {}", .code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    ExitStatus { command: String, code: Option<i32> },

    /// Process could not be spawned at all
    #[error("Failed to spawn '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Invocation exceeded its deadline
    #[error("'{command}' timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },
}

/// File watcher errors
#[derive(Error, Debug)]
pub enum WatchError {
    /// Watcher could not be created or attached
    #[error("Failed to watch '{path}': {error}")]
    Setup { path: PathBuf, error: String },
}

/// Settings file errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("Failed to read settings '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Settings file is malformed
    #[error("Failed to parse settings '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Value out of range
    #[error("Invalid setting '{name}': {message}")]
    Invalid { name: String, message: String },
}
