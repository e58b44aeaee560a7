//! AgentSession - one agent instance plus its conversation, for one task.
//!
//! A session owns the task's conversation history and usage counters and
//! drives a single chat step at a time: agent call, usage extraction, then an
//! evaluator call over the reconstructed context. Evaluator failures are
//! absorbed into a sentinel verdict; agent failures and call timeouts are
//! returned to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::errors::{CallTarget, DomainError, DomainResult};
use crate::domain::models::{
    first_usage, signals_completion, ConversationTurn, EvaluationContext, TaskDescriptor,
    TraceEntry, UsageStats, EVALUATION_UNAVAILABLE, TASK_COMPLETE_MARKER,
};
use crate::domain::ports::{Agent, AgentFactory, Evaluator};
use crate::services::prompts::render_agent_prompt;

/// Per-session knobs shared by every task of a run.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub completion_marker: String,
    pub agent_timeout: Option<Duration>,
    pub evaluator_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            completion_marker: TASK_COMPLETE_MARKER.to_string(),
            agent_timeout: None,
            evaluator_timeout: None,
        }
    }
}

/// Result of one chat step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Agent response, annotated when the verdict signalled completion.
    pub response: String,
    /// Evaluator verdict, or the unavailable sentinel.
    pub verdict: String,
}

pub struct AgentSession {
    task_index: usize,
    instruction: String,
    agent: Option<Box<dyn Agent>>,
    evaluator: Arc<dyn Evaluator>,
    settings: Arc<SessionSettings>,
    history: Vec<ConversationTurn>,
    usage: UsageStats,
    completed: bool,
}

impl AgentSession {
    /// Acquire an agent for `descriptor`.
    ///
    /// Fails with [`DomainError::InvalidTask`] when the descriptor has no
    /// instruction, before any agent is created.
    pub async fn open(
        task_index: usize,
        descriptor: &TaskDescriptor,
        factory: &dyn AgentFactory,
        evaluator: Arc<dyn Evaluator>,
        settings: Arc<SessionSettings>,
    ) -> DomainResult<Self> {
        let instruction = descriptor
            .instruction()
            .ok_or_else(|| DomainError::InvalidTask {
                index: task_index,
                reason: "descriptor has no initial instruction".to_string(),
            })?
            .to_string();

        let agent = factory
            .create(task_index, descriptor)
            .await
            .map_err(|err| match err {
                DomainError::SessionUnavailable(_) => err,
                other => DomainError::SessionUnavailable(other.to_string()),
            })?;

        debug!(
            task_index,
            factory = factory.name(),
            working_dir = descriptor.working_context(),
            "agent session opened"
        );

        Ok(Self {
            task_index,
            instruction,
            agent: Some(agent),
            evaluator,
            settings,
            history: Vec::new(),
            usage: UsageStats::default(),
            completed: false,
        })
    }

    /// Run one agent call followed by one evaluation.
    pub async fn chat(&mut self, user_input: &str) -> DomainResult<ChatTurn> {
        let agent = self
            .agent
            .as_mut()
            .ok_or_else(|| DomainError::SessionUnavailable("session already ended".to_string()))?;

        self.history.push(ConversationTurn::user(user_input));
        let prompt = render_agent_prompt(&self.history);

        let response = bounded(CallTarget::Agent, self.settings.agent_timeout, agent.run(&prompt))
            .await??;

        let trace = agent.trace();
        if let Some(report) = first_usage(&trace) {
            self.usage.record(&report);
        }

        self.history.push(ConversationTurn::assistant(response.clone()));

        let verdict = self.evaluate(trace).await?;

        let response = if signals_completion(&verdict, &self.settings.completion_marker) {
            self.completed = true;
            format!("{response}\n\nEvaluator: {}", self.settings.completion_marker)
        } else {
            response
        };

        Ok(ChatTurn { response, verdict })
    }

    async fn evaluate(&mut self, trace: Vec<TraceEntry>) -> DomainResult<String> {
        let context = EvaluationContext {
            instruction: self.instruction.clone(),
            trace,
            history: self.history.clone(),
            completion_marker: self.settings.completion_marker.clone(),
        };
        let evaluator = Arc::clone(&self.evaluator);

        let result = bounded(
            CallTarget::Evaluator,
            self.settings.evaluator_timeout,
            evaluator.evaluate(&context),
        )
        .await?;

        match result {
            Ok(verdict) => {
                if let Some(report) = verdict.usage.as_ref() {
                    self.usage.record(report);
                }
                Ok(verdict.text)
            }
            Err(err) => {
                warn!(
                    task_index = self.task_index,
                    error = %err,
                    "evaluation failed, continuing without a verdict"
                );
                Ok(EVALUATION_UNAVAILABLE.to_string())
            }
        }
    }

    /// True once any verdict in this session contained the completion marker.
    pub const fn is_complete(&self) -> bool {
        self.completed
    }

    pub const fn usage(&self) -> UsageStats {
        self.usage
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Release the agent. Later calls are no-ops.
    pub async fn end(&mut self) {
        if let Some(mut agent) = self.agent.take() {
            agent.shutdown().await;
            debug!(task_index = self.task_index, turns = self.history.len(), "agent session ended");
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if self.agent.is_some() {
            warn!(task_index = self.task_index, "agent session dropped without being ended");
        }
    }
}

/// Await `call`, failing with [`DomainError::CallTimeout`] once `limit` elapses.
async fn bounded<F: Future>(
    target: CallTarget,
    limit: Option<Duration>,
    call: F,
) -> DomainResult<F::Output> {
    match limit {
        Some(limit) => timeout(limit, call)
            .await
            .map_err(|_| DomainError::CallTimeout {
                target,
                seconds: limit.as_secs(),
            }),
        None => Ok(call.await),
    }
}
