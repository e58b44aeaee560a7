//! Table output formatting for CLI commands
//!
//! Renders run summaries and per-task outcomes with comfy-table. Colors are
//! dropped when `NO_COLOR` is set or the terminal is dumb.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::{single_line, truncate};
use crate::domain::models::{OutcomeStatus, RunSummary, TaskOutcome, UsageStats};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format the run summary as a metric/value table
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec!["Total tasks".to_string(), summary.total_tasks.to_string()]);
        table.add_row(vec![
            Cell::new("Completed"),
            self.colored(summary.completed_tasks.to_string(), Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Failed"),
            self.colored(summary.failed_tasks.to_string(), Color::Red),
        ]);
        table.add_row(vec![
            Cell::new("Timed out"),
            self.colored(summary.timeout_tasks.to_string(), Color::Yellow),
        ]);
        if summary.invalid_tasks > 0 {
            table.add_row(vec![
                "  of which invalid".to_string(),
                summary.invalid_tasks.to_string(),
            ]);
        }
        table.add_row(vec![
            "Success rate".to_string(),
            format!("{:.1}%", summary.success_rate_percent()),
        ]);
        if let Some(ceiling) = summary.max_concurrent {
            table.add_row(vec!["Max concurrent".to_string(), ceiling.to_string()]);
        }
        if let Some(elapsed) = summary.elapsed_seconds() {
            table.add_row(vec!["Elapsed".to_string(), format!("{elapsed:.1}s")]);
        }
        add_usage_rows(&mut table, &summary.usage);
        table.add_row(vec![
            "Finished at".to_string(),
            summary.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);

        table.to_string()
    }

    /// Format one row per task outcome
    pub fn format_outcomes(&self, outcomes: &[TaskOutcome]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Dir").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Iter").add_attribute(Attribute::Bold),
            Cell::new("Duration").add_attribute(Attribute::Bold),
            Cell::new("Tokens").add_attribute(Attribute::Bold),
            Cell::new("Note").add_attribute(Attribute::Bold),
        ]);

        for outcome in outcomes {
            let status_cell = if self.use_colors {
                Cell::new(outcome.status.to_string()).fg(status_color(outcome.status))
            } else {
                Cell::new(format!("{} {}", status_icon(outcome.status), outcome.status))
            };

            let note = outcome
                .error_message
                .as_deref()
                .or(outcome.last_evaluation.as_deref())
                .map_or_else(|| "-".to_string(), |text| truncate(&single_line(text), 50));

            table.add_row(vec![
                Cell::new(outcome.task_index),
                Cell::new(truncate(outcome.descriptor.working_context(), 30)),
                status_cell,
                Cell::new(outcome.iterations),
                Cell::new(format!("{:.1}s", outcome.duration_seconds)),
                Cell::new(outcome.usage.total_tokens),
                Cell::new(note),
            ]);
        }

        table.to_string()
    }

    /// Format the full record of one outcome as a field/value table
    pub fn format_outcome_details(&self, outcome: &TaskOutcome) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new(format!("Task {}", outcome.task_index)).add_attribute(Attribute::Bold),
            if self.use_colors {
                Cell::new(outcome.status.to_string()).fg(status_color(outcome.status))
            } else {
                Cell::new(outcome.status.to_string())
            },
        ]);

        table.add_row(vec!["Dir", outcome.descriptor.working_context()]);
        table.add_row(vec![
            "Prompt",
            outcome.descriptor.first_prompt.as_deref().unwrap_or("-"),
        ]);
        table.add_row(vec!["Iterations".to_string(), outcome.iterations.to_string()]);
        table.add_row(vec![
            "Duration".to_string(),
            format!("{:.2}s", outcome.duration_seconds),
        ]);
        add_usage_rows(&mut table, &outcome.usage);
        if let Some(kind) = outcome.failure_kind {
            table.add_row(vec!["Failure kind".to_string(), format!("{kind:?}")]);
        }
        if let Some(error) = &outcome.error_message {
            table.add_row(vec!["Error", error.as_str()]);
        }
        table.add_row(vec![
            "Last response",
            outcome.last_response.as_deref().unwrap_or("-"),
        ]);
        table.add_row(vec![
            "Last evaluation",
            outcome.last_evaluation.as_deref().unwrap_or("-"),
        ]);
        table.add_row(vec![
            "Recorded at".to_string(),
            outcome.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);

        table.to_string()
    }

    fn colored(&self, text: String, color: Color) -> Cell {
        if self.use_colors {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn add_usage_rows(table: &mut Table, usage: &UsageStats) {
    table.add_row(vec!["Total tokens".to_string(), usage.total_tokens.to_string()]);
    table.add_row(vec!["Prompt tokens".to_string(), usage.prompt_tokens.to_string()]);
    table.add_row(vec![
        "Completion tokens".to_string(),
        usage.completion_tokens.to_string(),
    ]);
    table.add_row(vec!["Calls".to_string(), usage.call_count.to_string()]);
    if usage.call_count > 0 {
        table.add_row(vec![
            "Avg tokens/call".to_string(),
            usage.average_tokens_per_call().to_string(),
        ]);
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    console::colors_enabled()
}

const fn status_color(status: OutcomeStatus) -> Color {
    match status {
        OutcomeStatus::Completed => Color::Green,
        OutcomeStatus::Error => Color::Red,
        OutcomeStatus::Timeout => Color::Yellow,
    }
}

const fn status_icon(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Completed => "✓",
        OutcomeStatus::Error => "✗",
        OutcomeStatus::Timeout => "⧗",
    }
}
