//! Domain models.

pub mod config;
pub mod conversation;
pub mod evaluation;
pub mod outcome;
pub mod summary;
pub mod task;
pub mod usage;

pub use config::{AgentConfig, AgentKind, Config, EvaluatorConfig, LoggingConfig};
pub use conversation::{first_usage, ConversationTurn, Role, TraceEntry};
pub use evaluation::{
    signals_completion, EvaluationContext, Verdict, EVALUATION_UNAVAILABLE, TASK_COMPLETE_MARKER,
};
pub use outcome::{FailureKind, OutcomeStatus, TaskOutcome};
pub use summary::{success_rate, RunSnapshot, RunSummary};
pub use task::TaskDescriptor;
pub use usage::{UsageReport, UsageStats};
