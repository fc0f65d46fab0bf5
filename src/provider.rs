use crate::types::{Message, Usage};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Why the provider ended a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Incremental output of one provider round.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    Text(String),
    /// Part of a tool call. `name` and `arguments` are each optional; argument
    /// fragments for the same `id` are concatenated in arrival order.
    ToolCallFragment {
        id: String,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// End of the round. `usage` carries running totals when the backend
    /// reports them.
    RoundComplete {
        reason: FinishReason,
        usage: Option<Usage>,
    },
}

pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<ProviderEvent>> + Send>>;

/// Everything a provider needs for one round.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub messages: &'a [Message],
    pub tools: &'a Value,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream(&self, request: CompletionRequest<'_>) -> anyhow::Result<EventStream>;

    /// Short label used in logs and eval summaries.
    fn label(&self) -> &str;
}
