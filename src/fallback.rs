//! Deterministic completion provider for running without a backend.
//!
//! It speaks the same event protocol as the live client: tool calls go out as
//! fragments followed by a `tool_calls` completion, and once the tool result is
//! in the history the answer is streamed in small fragments.

use crate::provider::{CompletionProvider, CompletionRequest, EventStream, FinishReason, ProviderEvent};
use crate::tools::required_str;
use crate::types::{JsonMap, Message, Role, Usage};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use std::time::Duration;
use uuid::Uuid;

pub const NO_EARLIER_MESSAGE: &str = "I don't see an earlier user message yet.";
pub const KB_MISS: &str = "I checked the KB but didn’t find a match.";
pub const HELP_TEXT: &str = "Mock mode is ON. I can demonstrate memory and tool use.\n\
     Try: 'What are the office hours?' or 'What is the weather in Dallas?' or 'Repeat what I asked earlier.'";

const KB_TRIGGERS: &[&str] = &["office hours", "grading", "late policy", "contact"];
const SUMMARY_CHARS: usize = 120;

static RECALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brepeat\b|\bearlier\b|\bwhat did i ask\b").expect("valid regex"));
static SUMMARIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsummarize\b").expect("valid regex"));
static CITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)weather\s+(in|for)\s+([A-Za-z .'-]{2,})").expect("valid regex"));

/// What the fallback decided to do with the latest user message.
#[derive(Debug, PartialEq)]
enum Plan {
    Answer(String),
    CallTool { name: &'static str, args: JsonMap },
}

#[derive(Clone, Debug)]
pub struct FallbackProvider {
    chunk_size: usize,
    fragment_delay: Duration,
}

impl FallbackProvider {
    pub fn new() -> Self {
        Self {
            chunk_size: 24,
            fragment_delay: Duration::from_millis(10),
        }
    }

    #[cfg(test)]
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    fn answer_stream(&self, context: &[Message], answer: String) -> EventStream {
        let usage = Usage::estimate(context, &answer);
        let delay = self.fragment_delay;
        let fragments = chunk_text(&answer, self.chunk_size);

        let text = stream::iter(fragments).then(move |fragment| async move {
            tokio::time::sleep(delay).await;
            Ok(ProviderEvent::Text(fragment))
        });
        let done = stream::once(async move {
            Ok(ProviderEvent::RoundComplete {
                reason: FinishReason::Stop,
                usage: Some(usage),
            })
        });
        Box::pin(text.chain(done))
    }

    fn tool_call_stream(&self, context: &[Message], name: &'static str, args: JsonMap) -> EventStream {
        let arguments = Value::Object(args).to_string();
        let usage = Usage::estimate(context, &arguments);
        let id = format!("call_{}", Uuid::new_v4().simple());
        let events = vec![
            Ok(ProviderEvent::ToolCallFragment {
                id,
                name: Some(name.to_string()),
                arguments: Some(arguments),
            }),
            Ok(ProviderEvent::RoundComplete {
                reason: FinishReason::ToolCalls,
                usage: Some(usage),
            }),
        ];
        Box::pin(stream::iter(events))
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for FallbackProvider {
    async fn stream(&self, request: CompletionRequest<'_>) -> anyhow::Result<EventStream> {
        let messages = request.messages;

        // Second round of a tool turn: answer from the tool output.
        if let Some(last) = messages.last().filter(|m| m.role == Role::Tool) {
            return Ok(self.answer_stream(messages, answer_from_tool(last)));
        }

        let user_text = last_user_message(messages);
        match plan(user_text, messages) {
            Plan::Answer(answer) => Ok(self.answer_stream(messages, answer)),
            Plan::CallTool { name, args } => Ok(self.tool_call_stream(messages, name, args)),
        }
    }

    fn label(&self) -> &str {
        "mock"
    }
}

fn plan(user_text: &str, messages: &[Message]) -> Plan {
    let text = user_text.trim();
    let lower = text.to_lowercase();

    if RECALL_RE.is_match(text) {
        let answer = match previous_user_message(messages) {
            Some(prev) => format!("You previously asked: {}", prev),
            None => NO_EARLIER_MESSAGE.to_string(),
        };
        return Plan::Answer(answer);
    }

    if let Some(trigger) = KB_TRIGGERS.iter().find(|t| lower.contains(*t)) {
        return Plan::CallTool {
            name: "lookup_kb",
            args: single_arg("query", trigger),
        };
    }

    if lower.contains("weather") {
        return Plan::CallTool {
            name: "get_weather",
            args: single_arg("city", &extract_city(text)),
        };
    }

    if SUMMARIZE_RE.is_match(text) {
        let last = last_user_message(messages);
        let head: String = last.chars().take(SUMMARY_CHARS).collect();
        let ellipsis = if last.chars().count() > SUMMARY_CHARS { "..." } else { "" };
        return Plan::Answer(format!("Summary: {}{}", head, ellipsis));
    }

    Plan::Answer(HELP_TEXT.to_string())
}

fn answer_from_tool(msg: &Message) -> String {
    let name = msg.name.as_deref().unwrap_or_default();
    let result: JsonMap = match serde_json::from_str(&msg.content) {
        Ok(Value::Object(map)) => map,
        _ => JsonMap::new(),
    };

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return format!("Sorry, the {} tool failed: {}", name, error);
    }

    match name {
        "get_weather" => format!(
            "Weather for {}: {}, {}°C.",
            required_str(&result, "city").unwrap_or("Unknown"),
            required_str(&result, "forecast").unwrap_or("unknown"),
            result.get("temp_c").cloned().unwrap_or(Value::Null),
        ),
        "lookup_kb" => match result.get("results").and_then(Value::as_object) {
            Some(hits) if !hits.is_empty() && !hits.contains_key("note") => hits
                .values()
                .next()
                .and_then(Value::as_str)
                .unwrap_or(KB_MISS)
                .to_string(),
            _ => KB_MISS.to_string(),
        },
        other => format!("The {} tool returned: {}", other, msg.content),
    }
}

fn single_arg(key: &str, value: &str) -> JsonMap {
    let mut args = JsonMap::new();
    args.insert(key.to_string(), json!(value));
    args
}

/// `weather in Dallas` -> `Dallas`, `weather for New York` -> `New York`;
/// otherwise the last word of the message.
fn extract_city(text: &str) -> String {
    if let Some(city) = CITY_RE.captures(text).and_then(|c| c.get(2)) {
        return city.as_str().trim().to_string();
    }
    text.split_whitespace().last().unwrap_or("Unknown").to_string()
}

fn last_user_message(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

fn previous_user_message(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .nth(1)
        .map(|m| m.content.as_str())
        .filter(|c| !c.is_empty())
}

fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(chunk_size.max(1)).map(|c| c.iter().collect()).collect()
}
