//! ResultStore - outcome collection, summaries and snapshot persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::models::{RunSnapshot, RunSummary, TaskOutcome};
use crate::services::usage_accumulator::UsageAccumulator;

/// Snapshot read/write errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to serialize run snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read snapshot from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Append-only outcome set for one run.
///
/// Outcomes may arrive in any order; readers always see them sorted by task
/// index. Aggregate usage is read from the run's [`UsageAccumulator`].
#[derive(Debug, Clone)]
pub struct ResultStore {
    outcomes: Arc<RwLock<Vec<TaskOutcome>>>,
    accumulator: UsageAccumulator,
    max_concurrent: Option<usize>,
    started_at: DateTime<Utc>,
}

impl ResultStore {
    pub fn new(accumulator: UsageAccumulator) -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(Vec::new())),
            accumulator,
            max_concurrent: None,
            started_at: Utc::now(),
        }
    }

    /// Record the concurrency ceiling in every summary.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    pub async fn record(&self, outcome: TaskOutcome) {
        debug!(task_index = outcome.task_index, status = %outcome.status, "outcome recorded");
        self.outcomes.write().await.push(outcome);
    }

    /// Recorded outcomes ordered by task index.
    pub async fn outcomes(&self) -> Vec<TaskOutcome> {
        let mut outcomes = self.outcomes.read().await.clone();
        outcomes.sort_by_key(|outcome| outcome.task_index);
        outcomes
    }

    pub async fn len(&self) -> usize {
        self.outcomes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outcomes.read().await.is_empty()
    }

    /// Recompute the run summary from every recorded outcome.
    pub async fn summarize(&self) -> RunSummary {
        let outcomes = self.outcomes.read().await;
        let usage = self.accumulator.snapshot().await;
        let summary =
            RunSummary::from_outcomes(&outcomes, usage).with_window(self.started_at, Utc::now());
        match self.max_concurrent {
            Some(ceiling) => summary.with_max_concurrent(ceiling),
            None => summary,
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            summary: self.summarize().await,
            results: self.outcomes().await,
        }
    }

    /// Write `{summary, results}` as pretty JSON to `destination`.
    ///
    /// The document is written to a sibling temp file first and renamed into
    /// place. On failure the in-memory outcomes are untouched.
    pub async fn persist(&self, destination: &Path) -> Result<RunSnapshot, PersistError> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Write {
                    path: destination.to_path_buf(),
                    source,
                })?;
        }

        let staging = staging_path(destination);
        fs::write(&staging, json)
            .await
            .map_err(|source| PersistError::Write {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, destination)
            .await
            .map_err(|source| PersistError::Write {
                path: destination.to_path_buf(),
                source,
            })?;

        info!(
            path = %destination.display(),
            results = snapshot.results.len(),
            "run snapshot persisted"
        );
        Ok(snapshot)
    }
}

/// Read a persisted snapshot.
pub async fn load_snapshot(path: &Path) -> Result<RunSnapshot, PersistError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| PersistError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| PersistError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OutcomeStatus, TaskDescriptor, UsageStats};
    use tempfile::TempDir;

    fn outcome(index: usize, status: OutcomeStatus) -> TaskOutcome {
        let mut outcome = TaskOutcome::aborted(index, TaskDescriptor::new(".", "task"), "x", 0.5);
        outcome.status = status;
        if status != OutcomeStatus::Error {
            outcome.error_message = None;
            outcome.failure_kind = None;
        }
        outcome
    }

    #[tokio::test]
    async fn test_outcomes_sorted_regardless_of_arrival() {
        let store = ResultStore::new(UsageAccumulator::new());
        store.record(outcome(2, OutcomeStatus::Completed)).await;
        store.record(outcome(0, OutcomeStatus::Timeout)).await;
        store.record(outcome(1, OutcomeStatus::Error)).await;

        let indices: Vec<usize> = store.outcomes().await.iter().map(|o| o.task_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_summary_uses_accumulator_totals() {
        let accumulator = UsageAccumulator::new();
        accumulator
            .merge(&UsageStats {
                total_tokens: 42,
                prompt_tokens: 40,
                completion_tokens: 2,
                call_count: 3,
            })
            .await;
        let store = ResultStore::new(accumulator).with_max_concurrent(4);
        store.record(outcome(0, OutcomeStatus::Completed)).await;
        store.record(outcome(1, OutcomeStatus::Timeout)).await;

        let summary = store.summarize().await;
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(summary.timeout_tasks, 1);
        assert_eq!(summary.usage.total_tokens, 42);
        assert_eq!(summary.max_concurrent, Some(4));
        assert!(summary.started_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_store_summary() {
        let store = ResultStore::new(UsageAccumulator::new());
        assert!(store.is_empty().await);
        let summary = store.summarize().await;
        assert_eq!(summary.total_tasks, 0);
        assert!(summary.success_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("results.json");

        let store = ResultStore::new(UsageAccumulator::new());
        store.record(outcome(1, OutcomeStatus::Completed)).await;
        store.record(outcome(0, OutcomeStatus::Error)).await;
        store.persist(&path).await.unwrap();

        assert!(!staging_path(&path).exists());
        let loaded = load_snapshot(&path).await.unwrap();
        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.results[0].task_index, 0);
        assert_eq!(loaded.summary.failed_tasks, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_outcomes() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = ResultStore::new(UsageAccumulator::new());
        store.record(outcome(0, OutcomeStatus::Completed)).await;

        let err = store.persist(&blocker.join("results.json")).await.unwrap_err();
        assert!(matches!(err, PersistError::Write { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_snapshot(&path).await, Err(PersistError::Parse { .. })));
        assert!(matches!(
            load_snapshot(&dir.path().join("missing.json")).await,
            Err(PersistError::Read { .. })
        ));
    }
}
