//! Error types for taskforge

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for taskforge operations
pub type Result<T> = std::result::Result<T, TaskforgeError>;

/// Main error type for taskforge
#[derive(Error, Debug)]
pub enum TaskforgeError {
    /// Configuration and registry errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Manifest (JSON) errors
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration, model and registry errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid task name '{0}': expected an identifier like 'build' or 'test:watch'")]
    InvalidTaskName(String),

    #[error("Task '{0}' is already defined with a different definition")]
    DuplicateTask(String),

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Task registry is locked; task '{0}' can no longer be changed")]
    RegistryLocked(String),

    #[error("A file is already registered at '{0}'")]
    DuplicateFile(PathBuf),

    #[error("Failed to include file '{path}': {error}")]
    IncludeFile { path: PathBuf, error: String },

    #[error("Failed to load env file '{path}': {error}")]
    EnvFile { path: PathBuf, error: String },
}

/// Task execution errors
///
/// Every variant except `StepFailure` aborts the whole run, regardless of
/// `continueOnError`.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Unknown builtin '{builtin}' (task '{task}', step {step})")]
    UnknownBuiltin {
        task: String,
        step: usize,
        builtin: String,
    },

    #[error("Cyclic task graph: {}", path.join(" -> "))]
    CyclicTaskGraph { path: Vec<String> },

    #[error("Task '{task}' failed at step {step} with exit code {exit_code}")]
    StepFailure {
        task: String,
        step: usize,
        exit_code: i32,
    },

    #[error("Builtin '{builtin}' failed (task '{task}', step {step}): {message}")]
    BuiltinFailure {
        task: String,
        step: usize,
        builtin: String,
        message: String,
    },

    #[error("Task '{task}' requires environment variable '{name}'")]
    MissingEnv { task: String, name: String },

    #[error("Failed to evaluate env '{name}' for task '{task}': {reason}")]
    EnvExpression {
        task: String,
        name: String,
        reason: String,
    },

    #[error("Failed to launch '{command}': {error}")]
    Spawn { command: String, error: io::Error },

    #[error("Task '{task}' was cancelled")]
    Cancelled { task: String },
}

impl ExecutionError {
    /// Process exit code the CLI reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionError::StepFailure { exit_code, .. } => *exit_code,
            ExecutionError::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Whether an error must abort the whole run rather than a single task
pub fn is_fatal(err: &ExecutionError) -> bool {
    !matches!(err, ExecutionError::StepFailure { .. })
}
