//! Taskloop - concurrent agent batch runner
//!
//! Taskloop runs a batch of independent tasks, each driven by an agent
//! conversation that iterates until an evaluator's verdict carries a
//! completion marker or an iteration cap is hit. Tasks run concurrently under
//! a ceiling, token usage is aggregated across the run, and every task ends
//! in exactly one persisted outcome.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, ports and errors
//! - **Service Layer** (`services`): session, loop, scheduler, store, accumulator
//! - **Adapters** (`adapters`): agent and evaluator implementations
//! - **Infrastructure Layer** (`infrastructure`): config, logging, task file
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskloop::adapters::agents::{ScriptedAgentFactory, ScriptedEvaluator};
//! use taskloop::domain::ports::NullStatusReporter;
//! use taskloop::{BatchRunner, Config, TaskDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = BatchRunner::from_config(
//!         &Config::default(),
//!         Arc::new(ScriptedAgentFactory::new()),
//!         Arc::new(ScriptedEvaluator::complete_after(2)),
//!         Arc::new(NullStatusReporter),
//!     );
//!     let run = runner.run(vec![TaskDescriptor::new(".", "write a haiku")]).await?;
//!     println!("{:.0}% completed", run.summary.success_rate_percent());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, OutcomeStatus, RunSnapshot, RunSummary, TaskDescriptor, TaskOutcome, UsageStats,
};
pub use domain::ports::{Agent, AgentFactory, Evaluator, StatusReporter};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BatchRunner, ConcurrencyScheduler, ConvergenceLoop, ResultStore};
