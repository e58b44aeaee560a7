//! Progress display for running batches using indicatif.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::ports::StatusReporter;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "  {spinner:.green} {prefix:.bold} {msg}";

const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Terminal status messages start with one of these.
const TERMINAL_PREFIXES: [&str; 3] = ["completed", "timed out", "error"];

/// Shows one overall bar plus a spinner line per running task.
///
/// Purely observational: it only reacts to status messages.
pub struct ProgressReporter {
    multi: MultiProgress,
    overall: ProgressBar,
    tasks: Mutex<HashMap<usize, ProgressBar>>,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self::with_target(total, ProgressDrawTarget::stderr())
    }

    /// A reporter that draws nothing (for `--json` and tests).
    pub fn hidden(total: usize) -> Self {
        Self::with_target(total, ProgressDrawTarget::hidden())
    }

    fn with_target(total: usize, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(total as u64));
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            overall.set_style(style.progress_chars(PROGRESS_CHARS));
        }
        overall.set_message("tasks settled");

        Self {
            multi,
            overall,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tasks that reported a terminal status.
    pub fn settled(&self) -> u64 {
        self.overall.position()
    }

    /// Clear per-task lines and close the overall bar.
    pub fn finish(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, bar) in tasks.drain() {
                bar.finish_and_clear();
            }
        }
        self.overall.finish();
    }

    fn spinner(&self, task_index: usize) -> ProgressBar {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            spinner.set_style(style.tick_chars(SPINNER_CHARS));
        }
        spinner.set_prefix(format!("task {task_index}"));
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

impl StatusReporter for ProgressReporter {
    fn report(&self, task_index: usize, message: &str) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };

        if is_terminal_message(message) {
            if let Some(bar) = tasks.remove(&task_index) {
                bar.finish_and_clear();
            }
            self.overall.inc(1);
            self.multi
                .println(format!("task {task_index}: {message}"))
                .ok();
            return;
        }

        let bar = tasks
            .entry(task_index)
            .or_insert_with(|| self.spinner(task_index));
        bar.set_message(message.to_string());
    }
}

fn is_terminal_message(message: &str) -> bool {
    TERMINAL_PREFIXES
        .iter()
        .any(|prefix| message.starts_with(prefix))
}
