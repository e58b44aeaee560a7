//! ConvergenceLoop - per-task iterate-until-converged state machine
//!
//! Drives one [`AgentSession`] through:
//! - `Pending -> Running(1)`: chat with the task's initial instruction
//! - `Running(k) -> Running(k+1)`: the previous verdict becomes the next user turn
//! - `Running(k) -> Completed`: a verdict carried the completion marker
//! - `Running(k) -> Error`: the chat call failed, timed out or panicked
//! - `Running(max) -> TimedOut`: the iteration cap was reached
//!
//! The session is ended on every terminal transition.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    signals_completion, FailureKind, OutcomeStatus, TaskDescriptor, TaskOutcome, UsageStats,
};
use crate::domain::ports::{AgentFactory, Evaluator, NullStatusReporter, StatusReporter};
use crate::services::agent_session::{AgentSession, SessionSettings};

/// Default iteration cap per task.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Position of a task in its convergence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Pending,
    /// 1-based iteration currently in flight.
    Running(u32),
    Completed,
    Error,
    TimedOut,
}

impl LoopState {
    /// Outcome status for a terminal state.
    pub const fn outcome_status(self) -> Option<OutcomeStatus> {
        match self {
            Self::Completed => Some(OutcomeStatus::Completed),
            Self::Error => Some(OutcomeStatus::Error),
            Self::TimedOut => Some(OutcomeStatus::Timeout),
            Self::Pending | Self::Running(_) => None,
        }
    }
}

/// Progress snapshot carried across iterations and into the outcome.
#[derive(Debug)]
struct Progress {
    state: LoopState,
    iterations: u32,
    last_response: Option<String>,
    last_evaluation: Option<String>,
}

impl Progress {
    const fn new() -> Self {
        Self {
            state: LoopState::Pending,
            iterations: 0,
            last_response: None,
            last_evaluation: None,
        }
    }
}

/// Runs single tasks to a terminal [`TaskOutcome`].
///
/// Cheap to clone; every collaborator is shared behind an `Arc`.
#[derive(Clone)]
pub struct ConvergenceLoop {
    factory: Arc<dyn AgentFactory>,
    evaluator: Arc<dyn Evaluator>,
    settings: Arc<SessionSettings>,
    reporter: Arc<dyn StatusReporter>,
    max_iterations: u32,
}

impl ConvergenceLoop {
    pub fn new(factory: Arc<dyn AgentFactory>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            factory,
            evaluator,
            settings: Arc::new(SessionSettings::default()),
            reporter: Arc::new(NullStatusReporter),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Set the iteration cap. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Drive the task at `task_index` to a terminal outcome.
    ///
    /// Never fails: every error is folded into the returned outcome.
    pub async fn run(&self, task_index: usize, descriptor: TaskDescriptor) -> TaskOutcome {
        let started = Instant::now();
        self.reporter.report(task_index, "started");

        let mut session = match AgentSession::open(
            task_index,
            &descriptor,
            self.factory.as_ref(),
            Arc::clone(&self.evaluator),
            Arc::clone(&self.settings),
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!(task_index, error = %err, "task could not start");
                self.reporter.report(task_index, &format!("error: {err}"));
                if matches!(err, DomainError::InvalidTask { .. }) {
                    return TaskOutcome::invalid(task_index, descriptor, err.to_string());
                }
                let usage = UsageStats::default();
                return Self::failed(task_index, descriptor, &err, Progress::new(), usage, started);
            }
        };

        let mut progress = Progress::new();
        let result = AssertUnwindSafe(self.drive(task_index, &mut session, &mut progress))
            .catch_unwind()
            .await;
        session.end().await;
        let usage = session.usage();

        let result = match result {
            Ok(result) => result,
            Err(panic) => {
                let message = format!("task aborted: {}", panic_message(panic.as_ref()));
                error!(task_index, iterations = progress.iterations, %message, "task panicked");
                self.reporter.report(task_index, &format!("error: {message}"));
                progress.state = LoopState::Error;
                let failure = Some((message, FailureKind::Aborted));
                return Self::settled(task_index, descriptor, progress, usage, failure, started);
            }
        };

        match result {
            Ok(state) => {
                progress.state = state;
                let message = match state {
                    LoopState::Completed => {
                        format!("completed after {} iteration(s)", progress.iterations)
                    }
                    _ => format!("timed out after {} iteration(s)", progress.iterations),
                };
                info!(
                    task_index,
                    iterations = progress.iterations,
                    status = ?state,
                    duration_secs = started.elapsed().as_secs_f64(),
                    total_tokens = usage.total_tokens,
                    "task settled"
                );
                self.reporter.report(task_index, &message);
                Self::settled(task_index, descriptor, progress, usage, None, started)
            }
            Err(err) => {
                warn!(
                    task_index,
                    iterations = progress.iterations,
                    error = %err,
                    "task failed"
                );
                self.reporter.report(task_index, &format!("error: {err}"));
                Self::failed(task_index, descriptor, &err, progress, usage, started)
            }
        }
    }

    async fn drive(
        &self,
        task_index: usize,
        session: &mut AgentSession,
        progress: &mut Progress,
    ) -> DomainResult<LoopState> {
        let marker = self.settings.completion_marker.as_str();
        let mut input = session.instruction().to_string();

        loop {
            let iteration = progress.iterations + 1;
            progress.state = LoopState::Running(iteration);
            progress.iterations = iteration;
            self.reporter.report(
                task_index,
                &format!("iteration {iteration}/{}", self.max_iterations),
            );
            debug!(task_index, iteration, "chat call");

            let turn = session.chat(&input).await?;
            progress.last_response = Some(turn.response);
            progress.last_evaluation = Some(turn.verdict.clone());

            if session.is_complete() {
                return Ok(LoopState::Completed);
            }

            // Verdict inspection before the next chat call.
            if signals_completion(&turn.verdict, marker) {
                return Ok(LoopState::Completed);
            }
            if iteration >= self.max_iterations {
                return Ok(LoopState::TimedOut);
            }

            input = turn.verdict;
        }
    }

    fn settled(
        task_index: usize,
        descriptor: TaskDescriptor,
        progress: Progress,
        usage: UsageStats,
        failure: Option<(String, FailureKind)>,
        started: Instant,
    ) -> TaskOutcome {
        let status = progress
            .state
            .outcome_status()
            .unwrap_or(OutcomeStatus::Error);
        let (error_message, failure_kind) = failure.unzip();

        TaskOutcome {
            task_index,
            descriptor,
            status,
            iterations: progress.iterations,
            duration_seconds: started.elapsed().as_secs_f64(),
            usage,
            last_response: progress.last_response,
            last_evaluation: progress.last_evaluation,
            error_message,
            failure_kind,
            timestamp: Utc::now(),
        }
    }

    fn failed(
        task_index: usize,
        descriptor: TaskDescriptor,
        err: &DomainError,
        mut progress: Progress,
        usage: UsageStats,
        started: Instant,
    ) -> TaskOutcome {
        progress.state = LoopState::Error;
        let failure = (err.to_string(), FailureKind::from_error(err));
        Self::settled(task_index, descriptor, progress, usage, Some(failure), started)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
