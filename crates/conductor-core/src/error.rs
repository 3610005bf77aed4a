use std::time::Duration;
use thiserror::Error;

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Top-level error type for Conductor.
///
/// The first four variants form the delegation taxonomy: they describe
/// partial failures that the orchestration layer converts into outcomes
/// rather than surfacing to the caller.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// Transport or non-2xx failure while dispatching a subtask.
    #[error("Submission error: {0}")]
    Submission(String),

    /// A read against a task id the remote registry does not know.
    #[error("Remote task not found: {0}")]
    RemoteTaskNotFound(String),

    /// The shared collection deadline elapsed with handles outstanding.
    #[error("Task timed out after {} seconds", .0.as_secs())]
    CollectionTimeout(Duration),

    /// Structured aggregation produced too little content.
    #[error("Aggregation degraded: {0}")]
    AggregationDegraded(String),

    /// An outbound HTTP request failed after submission.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The reasoning collaborator failed.
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    /// The decomposition collaborator failed.
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// Configuration parsing or validation error.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
