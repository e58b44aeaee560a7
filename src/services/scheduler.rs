//! ConcurrencyScheduler - bounded, FIFO admission of convergence loops.
//!
//! Admission uses a counting semaphore: a permit is acquired in input order
//! before each task is spawned and released when that task has recorded its
//! outcome. Every descriptor yields exactly one outcome, including tasks whose
//! pipeline panics.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskDescriptor, TaskOutcome};
use crate::services::convergence_loop::{panic_message, ConvergenceLoop};
use crate::services::result_store::ResultStore;
use crate::services::usage_accumulator::UsageAccumulator;

/// Default concurrency ceiling.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Clone)]
pub struct ConcurrencyScheduler {
    convergence: ConvergenceLoop,
    ceiling: usize,
}

impl ConcurrencyScheduler {
    /// Scheduler running at most `ceiling` loops at once (minimum 1).
    pub fn new(convergence: ConvergenceLoop, ceiling: usize) -> Self {
        Self {
            convergence,
            ceiling: ceiling.max(1),
        }
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Run every descriptor to a terminal outcome.
    ///
    /// Each settled outcome has its usage merged into `accumulator` and is
    /// recorded in `store`. Returns outcomes in input order once every task
    /// has settled. Fails only when `descriptors` is empty.
    pub async fn run_all(
        &self,
        descriptors: Vec<TaskDescriptor>,
        store: &ResultStore,
        accumulator: &UsageAccumulator,
    ) -> DomainResult<Vec<TaskOutcome>> {
        if descriptors.is_empty() {
            return Err(DomainError::NoTasks);
        }

        let total = descriptors.len();
        info!(total, ceiling = self.ceiling, "starting batch");

        let gate = Arc::new(Semaphore::new(self.ceiling));
        let mut tasks = JoinSet::new();

        for (task_index, descriptor) in descriptors.iter().cloned().enumerate() {
            // Blocks until a running task releases its slot.
            let Ok(permit) = Arc::clone(&gate).acquire_owned().await else {
                error!(task_index, "admission gate closed, remaining tasks not started");
                break;
            };

            let convergence = self.convergence.clone();
            let store = store.clone();
            let accumulator = accumulator.clone();

            tasks.spawn(async move {
                let started = Instant::now();
                let fallback = descriptor.clone();

                // The loop folds agent panics into its outcome; this only
                // catches panics outside a session.
                let outcome = match AssertUnwindSafe(convergence.run(task_index, descriptor))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(task_index, %message, "task pipeline panicked");
                        TaskOutcome::aborted(
                            task_index,
                            fallback,
                            format!("task aborted: {message}"),
                            started.elapsed().as_secs_f64(),
                        )
                    }
                };

                accumulator.merge(&outcome.usage).await;
                store.record(outcome.clone()).await;
                drop(permit);
                (task_index, outcome)
            });
        }

        let mut slots: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((task_index, outcome)) => slots[task_index] = Some(outcome),
                Err(err) => error!(error = %err, "task join failed"),
            }
        }

        let mut outcomes = Vec::with_capacity(total);
        for (task_index, slot) in slots.into_iter().enumerate() {
            let outcome = match slot {
                Some(outcome) => outcome,
                None => {
                    let outcome = TaskOutcome::aborted(
                        task_index,
                        descriptors[task_index].clone(),
                        "task did not settle",
                        0.0,
                    );
                    store.record(outcome.clone()).await;
                    outcome
                }
            };
            outcomes.push(outcome);
        }

        info!(total, "batch settled");
        Ok(outcomes)
    }
}
