//! BatchRunner - wires one run: fresh store and accumulator, scheduler, summary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, RunSnapshot, RunSummary, TaskDescriptor, TaskOutcome};
use crate::domain::ports::{AgentFactory, Evaluator, StatusReporter};
use crate::services::agent_session::SessionSettings;
use crate::services::convergence_loop::ConvergenceLoop;
use crate::services::result_store::{PersistError, ResultStore};
use crate::services::scheduler::ConcurrencyScheduler;
use crate::services::usage_accumulator::UsageAccumulator;

/// Runs batches of tasks with a fixed set of collaborators.
pub struct BatchRunner {
    scheduler: ConcurrencyScheduler,
}

/// Everything a finished run produced.
pub struct CompletedRun {
    /// Outcomes in input order.
    pub outcomes: Vec<TaskOutcome>,
    pub summary: RunSummary,
    store: ResultStore,
}

impl CompletedRun {
    /// Persist `{summary, results}` to `destination`.
    pub async fn persist(&self, destination: &Path) -> Result<RunSnapshot, PersistError> {
        self.store.persist(destination).await
    }
}

impl BatchRunner {
    pub const fn new(scheduler: ConcurrencyScheduler) -> Self {
        Self { scheduler }
    }

    /// Build the runner described by `config`.
    pub fn from_config(
        config: &Config,
        factory: Arc<dyn AgentFactory>,
        evaluator: Arc<dyn Evaluator>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let settings = SessionSettings {
            completion_marker: config.completion_marker.clone(),
            agent_timeout: config.agent_timeout_secs.map(Duration::from_secs),
            evaluator_timeout: config.evaluator_timeout_secs.map(Duration::from_secs),
        };
        let convergence = ConvergenceLoop::new(factory, evaluator)
            .with_max_iterations(config.max_iterations)
            .with_settings(settings)
            .with_reporter(reporter);
        Self::new(ConcurrencyScheduler::new(convergence, config.max_concurrent))
    }

    pub const fn max_concurrent(&self) -> usize {
        self.scheduler.ceiling()
    }

    /// Run `descriptors` to completion with a fresh store and accumulator.
    pub async fn run(&self, descriptors: Vec<TaskDescriptor>) -> DomainResult<CompletedRun> {
        let run_id = Uuid::new_v4();
        info!(%run_id, tasks = descriptors.len(), "run starting");

        let accumulator = UsageAccumulator::new();
        let store =
            ResultStore::new(accumulator.clone()).with_max_concurrent(self.scheduler.ceiling());

        let outcomes = self
            .scheduler
            .run_all(descriptors, &store, &accumulator)
            .await?;
        let summary = store.summarize().await;

        info!(
            %run_id,
            total = summary.total_tasks,
            completed = summary.completed_tasks,
            failed = summary.failed_tasks,
            timed_out = summary.timeout_tasks,
            total_tokens = summary.usage.total_tokens,
            "run finished"
        );

        Ok(CompletedRun {
            outcomes,
            summary,
            store,
        })
    }
}
