//! Scripted in-memory collaborators.
//!
//! Used by `taskloop run --dry-run` and throughout the test-suite. Nothing here
//! talks to a process or the network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EvaluationContext, Role, TaskDescriptor, TraceEntry, UsageReport, Verdict,
};
use crate::domain::ports::{Agent, AgentFactory, Evaluator};

/// One scripted agent response.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub text: String,
    pub usage: Option<UsageReport>,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
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

#[derive(Debug, Clone, Default)]
struct Script {
    replies: Vec<ScriptedReply>,
    default_usage: Option<UsageReport>,
    fail_on_call: Option<(u32, String)>,
    task_failures: HashMap<usize, (u32, String)>,
    unavailable_tasks: HashSet<usize>,
    panicking_tasks: HashMap<usize, u32>,
    latency: Option<Duration>,
}

impl Script {
    fn reply(&self, call: u32) -> ScriptedReply {
        let position = (call as usize).saturating_sub(1);
        self.replies.get(position).cloned().unwrap_or_else(|| ScriptedReply {
            text: format!("Finished step {call}."),
            usage: self.default_usage,
        })
    }

    fn failure(&self, task_index: usize, call: u32) -> Option<&str> {
        let (at, message) = self
            .task_failures
            .get(&task_index)
            .or(self.fail_on_call.as_ref())?;
        (*at == call).then_some(message.as_str())
    }
}

#[derive(Debug, Default)]
struct Counters {
    shutdowns: Arc<AtomicUsize>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    prompts: Arc<Mutex<Vec<String>>>,
}

/// Factory for [`ScriptedAgent`]s sharing one script and one set of counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgentFactory {
    script: Arc<Script>,
    counters: Arc<Counters>,
    created: Arc<AtomicUsize>,
}

impl ScriptedAgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    /// Replies for calls 1, 2, ...; later calls get a generic reply.
    #[must_use]
    pub fn with_replies(mut self, replies: Vec<ScriptedReply>) -> Self {
        self.script_mut().replies = replies;
        self
    }

    /// Usage attached to generic replies.
    #[must_use]
    pub fn with_default_usage(mut self, usage: UsageReport) -> Self {
        self.script_mut().default_usage = Some(usage);
        self
    }

    /// Every agent fails on its `call`-th run.
    #[must_use]
    pub fn failing_on_call(mut self, call: u32, message: impl Into<String>) -> Self {
        self.script_mut().fail_on_call = Some((call, message.into()));
        self
    }

    /// Only the agent of `task_index` fails, on its `call`-th run.
    #[must_use]
    pub fn failing_task(
        mut self,
        task_index: usize,
        call: u32,
        message: impl Into<String>,
    ) -> Self {
        self.script_mut()
            .task_failures
            .insert(task_index, (call, message.into()));
        self
    }

    /// Agent creation fails for `task_index`.
    #[must_use]
    pub fn unavailable_task(mut self, task_index: usize) -> Self {
        self.script_mut().unavailable_tasks.insert(task_index);
        self
    }

    /// The agent of `task_index` panics on its first run.
    #[must_use]
    pub fn panicking_task(self, task_index: usize) -> Self {
        self.panicking_task_on_call(task_index, 1)
    }

    /// The agent of `task_index` panics on its `call`-th run.
    #[must_use]
    pub fn panicking_task_on_call(mut self, task_index: usize, call: u32) -> Self {
        self.script_mut().panicking_tasks.insert(task_index, call);
        self
    }

    /// Every run sleeps for `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.script_mut().latency = Some(latency);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.counters.shutdowns.load(Ordering::SeqCst)
    }

    /// Highest number of agents alive at the same time.
    pub fn peak_active(&self) -> usize {
        self.counters.peak_active.load(Ordering::SeqCst)
    }

    pub fn create_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.created)
    }

    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.counters.shutdowns)
    }

    /// Every prompt any agent received, in call order.
    pub fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.counters.prompts)
    }
}

#[async_trait]
impl AgentFactory for ScriptedAgentFactory {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create(
        &self,
        task_index: usize,
        _descriptor: &TaskDescriptor,
    ) -> DomainResult<Box<dyn Agent>> {
        if self.script.unavailable_tasks.contains(&task_index) {
            return Err(DomainError::SessionUnavailable(format!(
                "no scripted agent for task {task_index}"
            )));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(ScriptedAgent {
            task_index,
            calls: 0,
            trace: Vec::new(),
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Agent replaying a [`ScriptedAgentFactory`] script.
#[derive(Debug)]
pub struct ScriptedAgent {
    task_index: usize,
    calls: u32,
    trace: Vec<TraceEntry>,
    script: Arc<Script>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn run(&mut self, prompt: &str) -> DomainResult<String> {
        self.calls += 1;
        self.trace.clear();

        if let Ok(mut prompts) = self.counters.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(latency) = self.script.latency {
            tokio::time::sleep(latency).await;
        }
        if self.script.panicking_tasks.get(&self.task_index) == Some(&self.calls) {
            panic!("scripted agent for task {} panicked", self.task_index);
        }
        if let Some(message) = self.script.failure(self.task_index, self.calls) {
            self.trace.push(TraceEntry::Error {
                message: message.to_string(),
            });
            return Err(DomainError::AgentCallFailed(message.to_string()));
        }

        let reply = self.script.reply(self.calls);
        self.trace.push(TraceEntry::Content {
            text: reply.text.clone(),
            usage: reply.usage,
        });
        Ok(reply.text)
    }

    fn trace(&self) -> Vec<TraceEntry> {
        self.trace.clone()
    }

    async fn shutdown(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
enum VerdictScript {
    CompleteAfter(usize),
    Sequence(Vec<String>),
    Failing(String),
}

/// Evaluator answering from the number of agent turns seen so far.
///
/// Stateless across calls, so one instance can serve every task of a run.
#[derive(Debug, Clone)]
pub struct ScriptedEvaluator {
    script: VerdictScript,
    usage: Option<UsageReport>,
    completion_marker: Option<String>,
    latency: Option<Duration>,
}

impl ScriptedEvaluator {
    /// Signal completion once the task has `iterations` agent turns.
    pub fn complete_after(iterations: usize) -> Self {
        Self::with_script(VerdictScript::CompleteAfter(iterations.max(1)))
    }

    /// Never signal completion.
    pub fn never_complete() -> Self {
        Self::with_script(VerdictScript::CompleteAfter(usize::MAX))
    }

    /// Verdict `n` for the `n`-th turn; the last one repeats.
    pub fn from_verdicts(verdicts: Vec<String>) -> Self {
        Self::with_script(VerdictScript::Sequence(verdicts))
    }

    /// Fail every evaluation.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(VerdictScript::Failing(message.into()))
    }

    const fn with_script(script: VerdictScript) -> Self {
        Self {
            script,
            usage: None,
            completion_marker: None,
            latency: None,
        }
    }

    /// Every evaluation sleeps for `latency` before answering.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Usage attached to every successful verdict.
    #[must_use]
    pub const fn with_usage(mut self, usage: UsageReport) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Answer with this marker instead of the one in the context.
    #[must_use]
    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = Some(marker.into());
        self
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, context: &EvaluationContext) -> DomainResult<Verdict> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let turns = context
            .history
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .count();
        let marker = self
            .completion_marker
            .as_deref()
            .unwrap_or(&context.completion_marker);

        let text = match &self.script {
            VerdictScript::Failing(message) => {
                return Err(DomainError::EvaluatorCallFailed(message.clone()));
            }
            VerdictScript::CompleteAfter(iterations) if turns >= *iterations => {
                format!("All requirements are met. {marker}")
            }
            VerdictScript::CompleteAfter(_) => {
                format!("Not finished yet: keep working on \"{}\".", context.instruction)
            }
            VerdictScript::Sequence(verdicts) => verdicts
                .get(turns.saturating_sub(1))
                .or_else(|| verdicts.last())
                .cloned()
                .unwrap_or_default(),
        };

        let verdict = Verdict::new(text);
        Ok(match self.usage {
            Some(usage) => verdict.with_usage(usage),
            None => verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{signals_completion, ConversationTurn, TASK_COMPLETE_MARKER};

    fn context(turns: usize) -> EvaluationContext {
        let mut history = Vec::new();
        for i in 0..turns {
            history.push(ConversationTurn::user(format!("u{i}")));
            history.push(ConversationTurn::assistant(format!("a{i}")));
        }
        EvaluationContext {
            instruction: "write a parser".to_string(),
            trace: Vec::new(),
            history,
            completion_marker: TASK_COMPLETE_MARKER.to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_after_counts_assistant_turns() {
        let evaluator = ScriptedEvaluator::complete_after(2);
        let first = evaluator.evaluate(&context(1)).await.unwrap();
        let second = evaluator.evaluate(&context(2)).await.unwrap();
        assert!(!signals_completion(&first.text, TASK_COMPLETE_MARKER));
        assert!(signals_completion(&second.text, TASK_COMPLETE_MARKER));
    }

    #[tokio::test]
    async fn test_sequence_repeats_last_verdict() {
        let evaluator =
            ScriptedEvaluator::from_verdicts(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(evaluator.evaluate(&context(1)).await.unwrap().text, "one");
        assert_eq!(evaluator.evaluate(&context(5)).await.unwrap().text, "two");
    }

    #[tokio::test]
    async fn test_agent_failure_only_for_configured_task() {
        let factory = ScriptedAgentFactory::new().failing_task(1, 2, "disk full");
        let descriptor = TaskDescriptor::new(".", "x");

        let mut healthy = factory.create(0, &descriptor).await.unwrap();
        let mut broken = factory.create(1, &descriptor).await.unwrap();
        assert!(healthy.run("p").await.is_ok());
        assert!(healthy.run("p").await.is_ok());
        assert!(broken.run("p").await.is_ok());
        assert!(broken.run("p").await.is_err());
        assert!(matches!(broken.trace()[0], TraceEntry::Error { .. }));

        assert_eq!(factory.peak_active(), 2);
        healthy.shutdown().await;
        broken.shutdown().await;
        assert_eq!(factory.shutdowns(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_task() {
        let factory = ScriptedAgentFactory::new().unavailable_task(0);
        let result = factory.create(0, &TaskDescriptor::new(".", "x")).await;
        assert!(matches!(result, Err(DomainError::SessionUnavailable(_))));
        assert_eq!(factory.created(), 0);
    }
}
