//! Ports to the external collaborators of a run.

pub mod agent;
pub mod evaluator;
pub mod status;

pub use agent::{Agent, AgentFactory};
pub use evaluator::Evaluator;
pub use status::{NullStatusReporter, StatusReporter};
