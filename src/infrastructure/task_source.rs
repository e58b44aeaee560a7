//! Task file loading.
//!
//! A task file is a JSON document of the form
//! `{"tasks": [{"dir": "...", "first_prompt": "..."}]}`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::TaskDescriptor;

#[derive(Error, Debug)]
pub enum TaskSourceError {
    #[error("Failed to read task file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Task index {index} out of range: {path} has {count} task(s)")]
    IndexOutOfRange {
        path: PathBuf,
        index: usize,
        count: usize,
    },
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<TaskDescriptor>,
}

/// Parse a task document from a string.
///
/// Entries with a missing or blank `first_prompt` are kept; they fail at run
/// time as invalid tasks.
pub fn parse_tasks(source: &str) -> Result<Vec<TaskDescriptor>, serde_json::Error> {
    serde_json::from_str::<TaskFile>(source).map(|file| file.tasks)
}

/// Load every task descriptor from `path`, in file order.
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<TaskDescriptor>, TaskSourceError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| TaskSourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let tasks = parse_tasks(&raw).map_err(|source| TaskSourceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), count = tasks.len(), "loaded task file");
    Ok(tasks)
}

/// Load only the task at `index`, for single-task runs.
pub fn load_task(
    path: impl AsRef<Path>,
    index: usize,
) -> Result<TaskDescriptor, TaskSourceError> {
    let path = path.as_ref();
    let mut tasks = load_tasks(path)?;
    let count = tasks.len();
    if index >= count {
        return Err(TaskSourceError::IndexOutOfRange {
            path: path.to_path_buf(),
            index,
            count,
        });
    }
    Ok(tasks.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn task_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_tasks_in_order() {
        let file = task_file(
            r#"{"tasks": [
                {"dir": "/work/a", "first_prompt": "build a snake game"},
                {"dir": "/work/b", "first_prompt": "write a README"},
                {"first_prompt": "no dir here"}
            ]}"#,
        );

        let tasks = load_tasks(file.path()).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].dir.as_deref(), Some("/work/a"));
        assert_eq!(tasks[1].instruction(), Some("write a README"));
        assert_eq!(tasks[2].working_context(), ".");
    }

    #[test]
    fn test_missing_tasks_key_is_empty() {
        assert!(parse_tasks(r#"{"other": 1}"#).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_entries_are_kept() {
        let tasks = parse_tasks(r#"{"tasks": [{"dir": "/x"}, {"first_prompt": ""}]}"#).unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|task| task.instruction().is_none()));
    }

    #[test]
    fn test_read_and_parse_errors() {
        let err = load_tasks("/nonexistent/task.json").unwrap_err();
        assert!(matches!(err, TaskSourceError::Read { .. }));

        let file = task_file("{not json");
        let err = load_tasks(file.path()).unwrap_err();
        assert!(matches!(err, TaskSourceError::Parse { .. }));
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_load_single_task() {
        let file = task_file(
            r#"{"tasks": [{"first_prompt": "a"}, {"first_prompt": "b"}, {"first_prompt": "c"}]}"#,
        );
        assert_eq!(load_task(file.path(), 1).unwrap().instruction(), Some("b"));
        assert_eq!(load_task(file.path(), 2).unwrap().instruction(), Some("c"));
        assert!(matches!(
            load_task(file.path(), 3),
            Err(TaskSourceError::IndexOutOfRange { index: 3, count: 3, .. })
        ));
    }
}
