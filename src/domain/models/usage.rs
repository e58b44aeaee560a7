//! Token and call usage statistics.

use serde::{Deserialize, Serialize};

/// Usage metadata reported by a single agent or evaluator call.
///
/// Providers are inconsistent: some report only one side, some omit the
/// total. Every field is optional and absent fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    #[serde(default)]
    pub total_tokens: Option<u64>,

    #[serde(default, alias = "input_tokens")]
    pub prompt_tokens: Option<u64>,

    #[serde(default, alias = "output_tokens")]
    pub completion_tokens: Option<u64>,
}

impl UsageReport {
    pub const fn new(total_tokens: u64, prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            total_tokens: Some(total_tokens),
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
        }
    }

    /// True when the report carries no counter at all.
    pub const fn is_empty(&self) -> bool {
        self.total_tokens.is_none()
            && self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
    }
}

/// Aggregate usage counters, per task or per run.
///
/// `total_tokens == prompt_tokens + completion_tokens` is not guaranteed:
/// each field is summed from what the providers reported, never derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub completion_tokens: u64,

    #[serde(default, rename = "calls")]
    pub call_count: u64,
}

impl UsageStats {
    /// Record one call's usage report.
    pub fn record(&mut self, report: &UsageReport) {
        self.total_tokens = self
            .total_tokens
            .saturating_add(report.total_tokens.unwrap_or(0));
        self.prompt_tokens = self
            .prompt_tokens
            .saturating_add(report.prompt_tokens.unwrap_or(0));
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(report.completion_tokens.unwrap_or(0));
        self.call_count = self.call_count.saturating_add(1);
    }

    /// Field-wise addition of another set of counters.
    pub fn merge(&mut self, delta: &Self) {
        self.total_tokens = self.total_tokens.saturating_add(delta.total_tokens);
        self.prompt_tokens = self.prompt_tokens.saturating_add(delta.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(delta.completion_tokens);
        self.call_count = self.call_count.saturating_add(delta.call_count);
    }

    /// Average total tokens per call, rounded to the nearest integer.
    pub const fn average_tokens_per_call(&self) -> u64 {
        if self.call_count == 0 {
            0
        } else {
            (self.total_tokens + self.call_count / 2) / self.call_count
        }
    }
}
