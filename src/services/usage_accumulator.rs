//! Run-level usage accumulation across concurrently finishing tasks.
//!
//! This is the only mutable state shared between tasks. Every mutation goes
//! through [`UsageAccumulator::merge`], which takes the write lock for the
//! whole field-wise addition, so concurrent merges never interleave.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::domain::models::UsageStats;

/// Monotonic, merge-only usage counters for one run.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    totals: Arc<RwLock<UsageStats>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all four counters of `delta` in one critical section.
    pub async fn merge(&self, delta: &UsageStats) {
        let mut totals = self.totals.write().await;
        totals.merge(delta);
        trace!(
            total_tokens = totals.total_tokens,
            calls = totals.call_count,
            "merged task usage"
        );
    }

    /// Current totals.
    pub async fn snapshot(&self) -> UsageStats {
        *self.totals.read().await
    }
}
