//! Error types for taskagent.

use thiserror::Error;

/// Result type alias using taskagent's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
///
/// The first eight variants are the core error taxonomy: they are always
/// captured as a `Step` rather than unwinding the run loop, with the sole
/// exception of `StoreIoError`, which is fatal to the run. The remaining
/// variants wrap ambient failures (config, HTTP, JSON, I/O) from the
/// providers and tools the core consumes.
#[derive(Error, Debug)]
pub enum Error {
    /// The LLM did not emit a parseable `Action`.
    #[error("planner could not parse an action from the model output: {0}")]
    PlannerParseError(String),

    /// The planner proposed a tool that does not exist in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments were rejected by schema validation, even after inference.
    #[error("schema validation failed for tool {tool}: {reason}")]
    SchemaValidation { tool: String, reason: String },

    /// A tool's `run` failed (after the reliability wrapper exhausted retries).
    #[error("tool execution failed: {0}")]
    ToolExecutionError(String),

    /// The circuit breaker for a tool is open.
    #[error("circuit_open:{0}")]
    CircuitOpen(String),

    /// The human denied an approval request.
    #[error("approval denied")]
    HumanDenied,

    /// The run was cooperatively interrupted.
    #[error("interrupted")]
    Interrupted,

    /// The run store failed to persist or load a run. Fatal to the run.
    #[error("run store I/O error: {0}")]
    StoreIoError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM or embedding provider error.
    #[error("provider error: {0}")]
    Provider(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error.
    #[error("environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the reliability wrapper should retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::ToolExecutionError(_) | Error::Provider(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
