use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent: {0}. Must be between 1 and 100")]
    InvalidMaxConcurrent(usize),

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Completion marker cannot be empty")]
    EmptyCompletionMarker,

    #[error("Invalid {field}: 0. Timeouts must be at least 1 second")]
    InvalidTimeout { field: &'static str },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskloop/config.yaml (project config)
    /// 3. .taskloop/local.yaml (local overrides, optional)
    /// 4. Environment variables (TASKLOOP_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".taskloop/config.yaml"))
            .merge(Yaml::file(".taskloop/local.yaml"))
            .merge(Env::prefixed("TASKLOOP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent == 0 || config.max_concurrent > 100 {
            return Err(ConfigError::InvalidMaxConcurrent(config.max_concurrent));
        }

        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(config.max_iterations));
        }

        if config.completion_marker.is_empty() {
            return Err(ConfigError::EmptyCompletionMarker);
        }

        if config.agent_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout {
                field: "agent_timeout_secs",
            });
        }
        if config.evaluator_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout {
                field: "evaluator_timeout_secs",
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.agent.binary.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "agent binary cannot be empty".to_string(),
            ));
        }

        if config.evaluator.base_url.is_empty() || config.evaluator.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "evaluator base_url and model must be set".to_string(),
            ));
        }

        if config.tasks_file.is_empty() || config.output_path.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tasks_file and output_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
