//! Infrastructure layer module
//!
//! Loading and process-wide concerns around the core services:
//! configuration, logging, and the task file.

pub mod config;
pub mod logging;
pub mod task_source;
