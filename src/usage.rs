//! Token accounting and per-turn metrics

use crate::types::{Message, ToolCallRecord, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// USD per 1M tokens (input, output).
const PRICING_PER_1M: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.30, 1.20),
    ("gpt-4o", 3.75, 15.00),
];

impl Usage {
    /// Fold in a provider report. Providers report running totals, so each
    /// counter keeps its maximum instead of summing.
    pub fn merge_max(&mut self, reported: Usage) {
        self.prompt_tokens = self.prompt_tokens.max(reported.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(reported.completion_tokens);
    }

    /// Word-count estimate for providers that report nothing.
    ///
    /// Prompt tokens cover every message in `context`, completion tokens the
    /// answer. Both are at least 1.
    pub fn estimate(context: &[Message], answer: &str) -> Usage {
        let prompt = context
            .iter()
            .map(|m| m.content.split_whitespace().count() as u64)
            .sum::<u64>();
        Usage {
            prompt_tokens: prompt.max(1),
            completion_tokens: (answer.split_whitespace().count() as u64).max(1),
        }
    }
}

/// Strip a dated snapshot suffix: `gpt-4o-mini-2024-07-18` -> `gpt-4o-mini`.
fn base_model_name(model: &str) -> &str {
    model.split("-20").next().unwrap_or(model)
}

pub fn estimate_cost_usd(model: &str, usage: Usage) -> f64 {
    let base = base_model_name(model);
    PRICING_PER_1M
        .iter()
        .find(|(name, _, _)| *name == base)
        .map(|(_, input, output)| {
            (usage.prompt_tokens as f64 / 1_000_000.0) * input
                + (usage.completion_tokens as f64 / 1_000_000.0) * output
        })
        .unwrap_or(0.0)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TurnMetrics {
    pub conversation_id: String,
    pub ts: DateTime<Utc>,
    pub model: String,
    pub latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd_est: f64,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Receives one record per completed turn.
#[cfg_attr(test, mockall::automock)]
pub trait UsageSink: Send + Sync {
    fn record(&self, metrics: TurnMetrics);
}

/// Emits each turn as a structured log event.
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, metrics: TurnMetrics) {
        let tools: Vec<&str> = metrics.tool_calls.iter().map(|t| t.name.as_str()).collect();
        info!(
            target: "taskchat::metrics",
            conversation_id = %metrics.conversation_id,
            model = %metrics.model,
            latency_ms = metrics.latency_ms,
            prompt_tokens = metrics.prompt_tokens,
            completion_tokens = metrics.completion_tokens,
            cost_usd_est = metrics.cost_usd_est,
            tool_calls = ?tools,
            "turn completed"
        );
    }
}
