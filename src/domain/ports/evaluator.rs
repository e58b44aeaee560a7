//! Evaluator port - the independent judge of task completion.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EvaluationContext, Verdict};

/// Single-turn evaluator returning free-form verdict text.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, context: &EvaluationContext) -> DomainResult<Verdict>;
}
