//! Core run services: sessions, convergence loops, scheduling and results.

pub mod agent_session;
pub mod batch_runner;
pub mod convergence_loop;
pub mod prompts;
pub mod result_store;
pub mod scheduler;
pub mod usage_accumulator;

pub use agent_session::{AgentSession, ChatTurn, SessionSettings};
pub use batch_runner::{BatchRunner, CompletedRun};
pub use convergence_loop::{ConvergenceLoop, LoopState, DEFAULT_MAX_ITERATIONS};
pub use result_store::{load_snapshot, PersistError, ResultStore};
pub use scheduler::{ConcurrencyScheduler, DEFAULT_MAX_CONCURRENT};
pub use usage_accumulator::UsageAccumulator;
