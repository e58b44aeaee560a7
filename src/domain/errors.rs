//! Domain errors for the taskloop batch runner.

use thiserror::Error;

/// Which external collaborator a failed call was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Agent,
    Evaluator,
}

impl std::fmt::Display for CallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Evaluator => write!(f, "evaluator"),
        }
    }
}

/// Domain-level errors that can occur while running a batch.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Agent call failed: {0}")]
    AgentCallFailed(String),

    #[error("Evaluator call failed: {0}")]
    EvaluatorCallFailed(String),

    #[error("{target} call timed out after {seconds}s")]
    CallTimeout { target: CallTarget, seconds: u64 },

    #[error("Invalid task {index}: {reason}")]
    InvalidTask { index: usize, reason: String },

    #[error("No tasks to run: the task list is empty")]
    NoTasks,

    #[error("Agent session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
