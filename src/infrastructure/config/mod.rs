//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - `.taskloop/config.yaml` and `.taskloop/local.yaml`
//! - `TASKLOOP_*` environment overrides
//! - Validation after merging

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
