//! Run-level summaries and persisted snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::{OutcomeStatus, TaskOutcome};
use super::usage::UsageStats;

/// Derived view over every outcome of a run.
///
/// Always recomputed from the full outcome set, never updated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub timeout_tasks: usize,
    /// Subset of `failed_tasks` caused by descriptors without an instruction.
    #[serde(default)]
    pub invalid_tasks: usize,
    /// `completed / total`, 0 when there are no tasks.
    #[serde(default)]
    pub success_rate: f64,
    #[serde(rename = "totalTokenStats", default)]
    pub usage: UsageStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    /// Scan `outcomes` and build counts around the given aggregate usage.
    pub fn from_outcomes(outcomes: &[TaskOutcome], usage: UsageStats) -> Self {
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();

        let total_tasks = outcomes.len();
        let completed_tasks = count(OutcomeStatus::Completed);

        Self {
            total_tasks,
            completed_tasks,
            failed_tasks: count(OutcomeStatus::Error),
            timeout_tasks: count(OutcomeStatus::Timeout),
            invalid_tasks: outcomes.iter().filter(|o| o.is_invalid_task()).count(),
            success_rate: success_rate(completed_tasks, total_tasks),
            usage,
            max_concurrent: None,
            started_at: None,
            finished_at: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    #[must_use]
    pub const fn with_window(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    /// Success rate as a percentage, for display.
    pub fn success_rate_percent(&self) -> f64 {
        self.success_rate * 100.0
    }

    /// Wall-clock length of the run, when both ends are known.
    pub fn elapsed_seconds(&self) -> Option<f64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        let millis = (end - start).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        Some(millis as f64 / 1000.0)
    }
}

/// `completed / total`, defined as 0 for an empty run.
#[allow(clippy::cast_precision_loss)]
pub fn success_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    }
}

/// Durable document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub summary: RunSummary,
    /// Outcomes ordered by task index.
    pub results: Vec<TaskOutcome>,
}

impl RunSnapshot {
    /// Re-derive the summary from `results`, keeping the stored run metadata.
    pub fn recompute_summary(&self) -> RunSummary {
        let usage = self.results.iter().fold(UsageStats::default(), |mut acc, outcome| {
            acc.merge(&outcome.usage);
            acc
        });

        let mut summary = RunSummary::from_outcomes(&self.results, usage);
        summary.max_concurrent = self.summary.max_concurrent;
        summary.started_at = self.summary.started_at;
        summary.finished_at = self.summary.finished_at;
        summary.timestamp = self.summary.timestamp;
        summary
    }
}
