//! `taskloop view`: inspect a persisted run snapshot.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{RunSnapshot, RunSummary, TaskOutcome};
use crate::infrastructure::config::ConfigLoader;
use crate::services::load_snapshot;

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Snapshot file (defaults to `output_path` from config)
    pub file: Option<PathBuf>,

    /// Show every field of every task
    #[arg(short, long)]
    pub details: bool,
}

#[derive(Debug, Serialize)]
pub struct ViewOutput {
    pub summary: RunSummary,
    pub results: Vec<TaskOutcome>,
    #[serde(skip)]
    details: bool,
}

impl ViewOutput {
    /// Summary is re-derived from `results`; the stored one only supplies
    /// run metadata.
    pub fn from_snapshot(snapshot: &RunSnapshot, details: bool) -> Self {
        Self {
            summary: snapshot.recompute_summary(),
            results: snapshot.results.clone(),
            details,
        }
    }
}

impl CommandOutput for ViewOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![formatter.format_summary(&self.summary)];

        if self.results.is_empty() {
            lines.push("No task results recorded.".to_string());
        } else if self.details {
            for outcome in &self.results {
                lines.push(String::new());
                lines.push(formatter.format_outcome_details(outcome));
            }
        } else {
            lines.push(String::new());
            lines.push(formatter.format_outcomes(&self.results));
        }

        lines.join("\n")
    }
}

pub async fn execute(args: ViewArgs, json: bool, config_path: Option<&Path>) -> Result<()> {
    let path = match args.file {
        Some(path) => path,
        None => {
            let config = match config_path {
                Some(path) => ConfigLoader::load_from_file(path)?,
                None => ConfigLoader::load()?,
            };
            PathBuf::from(config.output_path)
        }
    };

    let snapshot = load_snapshot(&path)
        .await
        .with_context(|| format!("Failed to read results from {}", path.display()))?;

    let stored = &snapshot.summary;
    let derived = snapshot.recompute_summary();
    if stored.total_tasks != derived.total_tasks
        || stored.completed_tasks != derived.completed_tasks
        || stored.usage != derived.usage
    {
        tracing::warn!(
            path = %path.display(),
            "stored summary disagrees with results; showing the re-derived one"
        );
    }

    output(&ViewOutput::from_snapshot(&snapshot, args.details), json);
    Ok(())
}
