use crate::types::{Message, ToolCallRecord, Usage};
use crate::usage::{TurnMetrics, UsageSink, TracingUsageSink, estimate_cost_usd};
use chrono::Utc;
use serde_json::json;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_max() {
        let mut usage = Usage::default();
        usage.merge_max(Usage { prompt_tokens: 10, completion_tokens: 3 });
        usage.merge_max(Usage { prompt_tokens: 8, completion_tokens: 5 });
        assert_eq!(usage, Usage { prompt_tokens: 10, completion_tokens: 5 });
    }

    #[test]
    fn test_estimate_counts_words() {
        let context = vec![Message::system("be brief"), Message::user("what is the weather")];
        let usage = Usage::estimate(&context, "Sunny and warm");
        assert_eq!(usage, Usage { prompt_tokens: 6, completion_tokens: 3 });
    }

    #[test]
    fn test_estimate_minimum_is_one() {
        assert_eq!(
            Usage::estimate(&[], ""),
            Usage { prompt_tokens: 1, completion_tokens: 1 }
        );
    }

    #[test]
    fn test_cost_known_models() {
        let usage = Usage { prompt_tokens: 1_000_000, completion_tokens: 1_000_000 };
        assert!((estimate_cost_usd("gpt-4o-mini", usage) - 1.50).abs() < 1e-9);
        assert!((estimate_cost_usd("gpt-4o", usage) - 18.75).abs() < 1e-9);
    }

    #[test]
    fn test_cost_dated_snapshot_uses_base_price() {
        let usage = Usage { prompt_tokens: 2_000, completion_tokens: 500 };
        assert_eq!(
            estimate_cost_usd("gpt-4o-mini-2024-07-18", usage),
            estimate_cost_usd("gpt-4o-mini", usage)
        );
    }

    #[test]
    fn test_cost_unknown_model_is_zero() {
        let usage = Usage { prompt_tokens: 100, completion_tokens: 100 };
        assert_eq!(estimate_cost_usd("llama-3-70b", usage), 0.0);
    }

    #[test]
    fn test_metrics_serialization() {
        let metrics = TurnMetrics {
            conversation_id: "c1".to_string(),
            ts: Utc::now(),
            model: "gpt-4o-mini".to_string(),
            latency_ms: 12,
            prompt_tokens: 3,
            completion_tokens: 4,
            cost_usd_est: 0.0,
            tool_calls: vec![ToolCallRecord {
                name: "lookup_kb".to_string(),
                args: json!({ "query": "grading" }).as_object().unwrap().clone(),
                result: json!({ "results": {} }).as_object().unwrap().clone(),
            }],
        };

        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["tool_calls"][0]["name"], "lookup_kb");
        assert_eq!(value["tool_calls"][0]["args"]["query"], "grading");

        let back: TurnMetrics = serde_json::from_value(value).unwrap();
        assert_eq!(back, metrics);

        // Logging sink accepts it without a subscriber installed.
        TracingUsageSink.record(back);
    }
}
