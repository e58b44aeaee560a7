//! Adapters for the external agent and evaluator.

pub mod agents;
