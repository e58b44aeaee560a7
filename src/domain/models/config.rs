use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::evaluation::TASK_COMPLETE_MARKER;

/// Main configuration structure for taskloop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of tasks running at once (1-100)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Iteration cap per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Verdict substring that marks a task as complete
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,

    /// Wall-clock limit for a single agent call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_timeout_secs: Option<u64>,

    /// Wall-clock limit for a single evaluator call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_timeout_secs: Option<u64>,

    /// Task definition file
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,

    /// Where the run snapshot is written
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command-line agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Evaluator endpoint configuration
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

const fn default_max_concurrent() -> usize {
    3
}

const fn default_max_iterations() -> u32 {
    10
}

fn default_completion_marker() -> String {
    TASK_COMPLETE_MARKER.to_string()
}

fn default_tasks_file() -> String {
    "task.json".to_string()
}

fn default_output_path() -> String {
    "parallel_batch_results.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_iterations: default_max_iterations(),
            completion_marker: default_completion_marker(),
            agent_timeout_secs: None,
            evaluator_timeout_secs: None,
            tasks_file: default_tasks_file(),
            output_path: default_output_path(),
            logging: LoggingConfig::default(),
            agent: AgentConfig::default(),
            evaluator: EvaluatorConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Which agent implementation drives tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Command-line coding agent, one process per chat call
    #[default]
    Cli,
    /// Tool-less chat agent on the evaluator's endpoint
    Chat,
}

/// Agent configuration; `binary`, `args` and `env` apply to the CLI agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent implementation
    #[serde(default)]
    pub kind: AgentKind,

    /// Agent executable
    #[serde(default = "default_agent_binary")]
    pub binary: String,

    /// Arguments placed before the prompt
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Model passed with `--model`, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Extra environment for the agent process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_agent_binary() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            kind: AgentKind::default(),
            binary: default_agent_binary(),
            args: default_agent_args(),
            model: None,
            env: HashMap::new(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint used as the evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvaluatorConfig {
    /// API base URL (`/chat/completions` is appended)
    #[serde(default = "default_evaluator_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_evaluator_model")]
    pub model: String,

    /// API key; falls back to the `api_key_env` variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Completion token limit, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_evaluator_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_evaluator_model() -> String {
    "deepseek-chat".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_request_timeout() -> u64 {
    300
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_evaluator_base_url(),
            model: default_evaluator_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
            max_tokens: None,
        }
    }
}

impl EvaluatorConfig {
    /// API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.is_empty())
    }
}
