//! Evaluator inputs and verdicts.

use serde::{Deserialize, Serialize};

use super::conversation::{ConversationTurn, TraceEntry};
use super::usage::UsageReport;

/// Substring whose presence in a verdict signals task completion.
///
/// Matching is a plain substring test, so any verdict that merely mentions
/// the phrase (even negated) counts as completion.
pub const TASK_COMPLETE_MARKER: &str = "任务已完成";

/// Verdict substituted when the evaluator call fails. Never contains the
/// completion marker.
pub const EVALUATION_UNAVAILABLE: &str =
    "Evaluation unavailable: the evaluator could not determine whether the task is complete. \
     Review the original task and continue working on anything that is still missing.";

/// Everything the evaluator sees when judging a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// The task's original instruction.
    pub instruction: String,
    /// Structured trace of the agent's most recent call.
    pub trace: Vec<TraceEntry>,
    /// Full conversation history, oldest first.
    pub history: Vec<ConversationTurn>,
    /// Marker the evaluator should answer with once the task is done.
    pub completion_marker: String,
}

/// Free-form evaluator output plus optional usage metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub text: String,
    pub usage: Option<UsageReport>,
}

impl Verdict {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: UsageReport) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// True if `verdict` contains `marker` anywhere.
pub fn signals_completion(verdict: &str, marker: &str) -> bool {
    !marker.is_empty() && verdict.contains(marker)
}
