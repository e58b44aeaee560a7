//! Domain layer for the taskloop batch runner
//!
//! This module contains the core data model, the ports to external
//! collaborators (agent, evaluator, status reporting) and domain errors.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{CallTarget, DomainError, DomainResult};
