//! Agent port - the conversational agent driven by each task.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskDescriptor, TraceEntry};

/// One agent instance, exclusively owned by a single task's session.
///
/// The session calls [`Agent::run`] once per chat step with the full-context
/// prompt, reads the best-effort [`Agent::trace`] afterwards, and calls
/// [`Agent::shutdown`] exactly once when the task settles.
#[async_trait]
pub trait Agent: Send {
    /// Run the agent on `prompt` and return its textual response.
    async fn run(&mut self, prompt: &str) -> DomainResult<String>;

    /// Structured trace of the most recent call. May be empty.
    fn trace(&self) -> Vec<TraceEntry>;

    /// Release any resources held by the agent.
    async fn shutdown(&mut self);
}

/// Creates one [`Agent`] per task.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Acquire an agent for the task at `task_index`.
    async fn create(
        &self,
        task_index: usize,
        descriptor: &TaskDescriptor,
    ) -> DomainResult<Box<dyn Agent>>;
}
