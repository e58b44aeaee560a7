//! Terminal per-task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskDescriptor;
use super::usage::UsageStats;
use crate::domain::errors::DomainError;

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The evaluator signalled completion.
    Completed,
    /// The task failed (invalid descriptor, agent error, call timeout).
    Error,
    /// The iteration cap was reached without a completion signal.
    Timeout,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Why a task ended in [`OutcomeStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The descriptor had no initial instruction.
    InvalidTask,
    /// The agent could not be acquired for this task.
    SessionUnavailable,
    /// The agent call itself failed.
    AgentCall,
    /// An agent or evaluator call exceeded its wall-clock timeout.
    CallTimeout,
    /// The task pipeline panicked or was torn down before settling.
    Aborted,
}

impl FailureKind {
    /// Classify a domain error raised inside a task's pipeline.
    pub const fn from_error(err: &DomainError) -> Self {
        match err {
            DomainError::InvalidTask { .. } => Self::InvalidTask,
            DomainError::SessionUnavailable(_) => Self::SessionUnavailable,
            DomainError::CallTimeout { .. } => Self::CallTimeout,
            _ => Self::AgentCall,
        }
    }
}

/// Immutable record of one task's lifecycle, created exactly once per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    /// Position of the descriptor in the input sequence.
    pub task_index: usize,

    #[serde(rename = "task")]
    pub descriptor: TaskDescriptor,

    pub status: OutcomeStatus,

    /// Number of chat calls attempted.
    pub iterations: u32,

    pub duration_seconds: f64,

    /// Usage snapshot for this task.
    #[serde(rename = "tokenStats")]
    pub usage: UsageStats,

    #[serde(default)]
    pub last_response: Option<String>,

    #[serde(default)]
    pub last_evaluation: Option<String>,

    #[serde(default, rename = "error")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    pub timestamp: DateTime<Utc>,
}

impl TaskOutcome {
    /// Outcome for a descriptor that carries no work.
    pub fn invalid(task_index: usize, descriptor: TaskDescriptor, reason: impl Into<String>) -> Self {
        Self {
            task_index,
            descriptor,
            status: OutcomeStatus::Error,
            iterations: 0,
            duration_seconds: 0.0,
            usage: UsageStats::default(),
            last_response: None,
            last_evaluation: None,
            error_message: Some(reason.into()),
            failure_kind: Some(FailureKind::InvalidTask),
            timestamp: Utc::now(),
        }
    }

    /// Outcome for a task whose pipeline never settled normally.
    pub fn aborted(
        task_index: usize,
        descriptor: TaskDescriptor,
        message: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            task_index,
            descriptor,
            status: OutcomeStatus::Error,
            iterations: 0,
            duration_seconds,
            usage: UsageStats::default(),
            last_response: None,
            last_evaluation: None,
            error_message: Some(message.into()),
            failure_kind: Some(FailureKind::Aborted),
            timestamp: Utc::now(),
        }
    }

    pub fn is_invalid_task(&self) -> bool {
        self.failure_kind == Some(FailureKind::InvalidTask)
    }
}
