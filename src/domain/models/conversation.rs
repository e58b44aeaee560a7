//! Conversation history and structured agent traces.

use serde::{Deserialize, Serialize};

use super::usage::UsageReport;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a task's append-only conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single item of the structured trace an agent leaves behind after a call.
///
/// Traces are best-effort: an agent may return an empty trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEntry {
    /// Text the agent produced.
    Content {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UsageReport>,
    },
    /// A tool invocation together with its result, when known.
    ToolCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default)]
        result: serde_json::Value,
    },
    /// An error the agent reported while working.
    Error { message: String },
    /// Usage metadata not attached to any content.
    Usage { usage: UsageReport },
}

impl TraceEntry {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            text: text.into(),
            usage: None,
        }
    }

    /// Usage metadata carried by this entry, if any.
    pub const fn usage(&self) -> Option<&UsageReport> {
        match self {
            Self::Content { usage, .. } => usage.as_ref(),
            Self::Usage { usage } => Some(usage),
            Self::ToolCall { .. } | Self::Error { .. } => None,
        }
    }
}

/// First usage report found in a trace, if any.
pub fn first_usage(trace: &[TraceEntry]) -> Option<UsageReport> {
    trace
        .iter()
        .filter_map(TraceEntry::usage)
        .find(|usage| !usage.is_empty())
        .copied()
}
