//! Error types for Tasku

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Tasku operations
pub type Result<T> = std::result::Result<T, TaskuError>;

/// Main error type for Tasku
#[derive(Error, Debug)]
pub enum TaskuError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scope resolution errors (argument binding, env-files)
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Template rendering errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Group '{0}' is not defined")]
    GroupNotFound(String),

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Hook in '{referrer}' points to unknown task '{target}'")]
    UnknownTaskReference { referrer: String, target: String },

    #[error("Cyclic hook chain detected: {0}")]
    CyclicHook(String),

    #[error("Unknown host '{0}' referenced by task")]
    UnknownHost(String),

    #[error("Failed to load env-file '{path}': {error}")]
    EnvFile { path: PathBuf, error: String },
}

/// Scope resolution errors
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Argument '{0}' is required but was not provided")]
    MissingRequiredArgument(String),

    #[error("Invalid value for argument '{name}': {error}")]
    ValidationError { name: String, error: String },

    #[error("Failed to prompt for argument '{name}': {error}")]
    Prompt { name: String, error: String },
}

/// Template rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Variable '{name}' is not defined (while rendering {scope} scope)")]
    UndefinedVariable { name: String, scope: String },

    #[error("Invalid template expression '{0}': {1}")]
    InvalidExpression(String, String),
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task '{task}' failed with exit code {code:?}")]
    TaskFailed { task: String, code: Option<i32> },

    #[error("Backend '{backend}' is unavailable: {error}")]
    BackendUnavailable { backend: String, error: String },

    #[error("Task '{task}' was interrupted")]
    Interrupted { task: String },

    #[error("{phase} '{task}' failed: {source}")]
    HookFailed {
        phase: Phase,
        task: String,
        #[source]
        source: Box<TaskuError>,
    },

    #[error("Failed to open log file '{path}': {error}")]
    LogFile { path: PathBuf, error: String },
}

/// Hook phase attribution for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreHook,
    PostHook,
    FailureHook,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::PreHook => "pre-hook",
            Phase::PostHook => "post-hook",
            Phase::FailureHook => "failure-hook",
        };
        write!(f, "{}", name)
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for rendering operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Process exit code for an error. Configuration and validation problems
/// exit 2, execution failures exit 1.
pub fn exit_code(err: &TaskuError) -> i32 {
    match err {
        TaskuError::Config(_) | TaskuError::Scope(_) | TaskuError::Yaml(_) => 2,
        _ => 1,
    }
}
