//! Task descriptors as supplied by the task source.

use serde::{Deserialize, Serialize};

/// Immutable input for one task: where the agent works and what it is asked.
///
/// The field names match the task file format (`dir`, `first_prompt`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Working-context identifier (usually a directory). `None` means the
    /// process working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Initial instruction handed to the agent.
    #[serde(default)]
    pub first_prompt: Option<String>,
}

impl TaskDescriptor {
    pub fn new(dir: impl Into<String>, first_prompt: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
            first_prompt: Some(first_prompt.into()),
        }
    }

    /// The initial instruction, if the descriptor carries a usable one.
    ///
    /// An empty or whitespace-only prompt counts as missing.
    pub fn instruction(&self) -> Option<&str> {
        self.first_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }

    /// Working directory for the agent, falling back to `"."`.
    pub fn working_context(&self) -> &str {
        self.dir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .unwrap_or(".")
    }
}
