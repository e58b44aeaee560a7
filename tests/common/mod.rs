//! Common test utilities for integration tests
//!
//! Shared fixtures for building runs with scripted collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use taskloop::adapters::agents::{ScriptedAgentFactory, ScriptedEvaluator};
use taskloop::domain::models::TaskDescriptor;
use taskloop::domain::ports::{NullStatusReporter, StatusReporter};
use taskloop::services::{ConcurrencyScheduler, ConvergenceLoop, ResultStore, UsageAccumulator};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `count` valid descriptors with distinct prompts.
pub fn descriptors(count: usize) -> Vec<TaskDescriptor> {
    (0..count)
        .map(|i| TaskDescriptor::new(format!("/work/task-{i}"), format!("task number {i}")))
        .collect()
}

/// Scheduler over a fresh loop with the given collaborators.
pub fn scheduler(
    factory: ScriptedAgentFactory,
    evaluator: ScriptedEvaluator,
    max_iterations: u32,
    ceiling: usize,
) -> ConcurrencyScheduler {
    let convergence = ConvergenceLoop::new(Arc::new(factory), Arc::new(evaluator))
        .with_max_iterations(max_iterations)
        .with_reporter(Arc::new(NullStatusReporter));
    ConcurrencyScheduler::new(convergence, ceiling)
}

/// Store and accumulator for one run.
pub fn run_state(ceiling: usize) -> (ResultStore, UsageAccumulator) {
    let accumulator = UsageAccumulator::new();
    let store = ResultStore::new(accumulator.clone()).with_max_concurrent(ceiling);
    (store, accumulator)
}

/// Status reporter that records every `(task_index, message)`.
#[derive(Default, Clone)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<(usize, String)>>>,
}

impl RecordingReporter {
    pub fn messages_for(&self, task_index: usize) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(index, _)| *index == task_index)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, task_index: usize, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((task_index, message.to_string()));
    }
}
