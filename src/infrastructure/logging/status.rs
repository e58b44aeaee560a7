use tracing::info;

use crate::domain::ports::StatusReporter;

/// Forwards loop status updates to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn report(&self, task_index: usize, message: &str) {
        info!(task_index, status = message, "task status");
    }
}
