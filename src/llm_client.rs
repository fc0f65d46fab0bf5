use crate::provider::{CompletionProvider, CompletionRequest, EventStream, FinishReason, ProviderEvent};
use crate::types::Usage;
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use tokio::time::Duration;
use tracing::{debug, error};

/// Streaming client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn stream(&self, request: CompletionRequest<'_>) -> anyhow::Result<EventStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if request.tools.as_array().is_some_and(|t| !t.is_empty()) {
            body["tools"] = request.tools.clone();
        }

        debug!(model = request.model, messages = request.messages.len(), "posting chat completion");
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            error!(%status, "chat completion request rejected");
            bail!("API error ({}): {}", status, detail);
        }

        let data = resp.bytes_stream().eventsource().map(|r| r.map(|ev| ev.data));
        Ok(Box::pin(decode_sse(data)))
    }

    fn label(&self) -> &str {
        "openai"
    }
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u64,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Turns chat-completion chunks into provider events.
///
/// Tool-call deltas are keyed by `index` on the wire and carry the call id only
/// on their first fragment, so ids are remembered per index.
#[derive(Default)]
pub(crate) struct ChunkDecoder {
    call_ids: HashMap<u64, String>,
    finish: Option<FinishReason>,
    usage: Option<Usage>,
}

impl ChunkDecoder {
    pub(crate) fn decode(&mut self, data: &str) -> anyhow::Result<Vec<ProviderEvent>> {
        let chunk: Chunk =
            serde_json::from_str(data).map_err(|e| anyhow!("SSE parsing error: {}, data: {}", e, data))?;

        if let Some(err) = chunk.error {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            bail!("API error: {}", message);
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }

        let mut events = Vec::new();
        for choice in chunk.choices.into_iter().take(1) {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    events.push(ProviderEvent::Text(content));
                }
                for tc in delta.tool_calls.unwrap_or_default() {
                    let id = match tc.id {
                        Some(id) => {
                            self.call_ids.insert(tc.index, id.clone());
                            id
                        }
                        None => self
                            .call_ids
                            .entry(tc.index)
                            .or_insert_with(|| format!("call_{}", tc.index))
                            .clone(),
                    };
                    let (name, arguments) = match tc.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    events.push(ProviderEvent::ToolCallFragment { id, name, arguments });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish = Some(FinishReason::parse(&reason));
            }
        }
        Ok(events)
    }

    pub(crate) fn saw_finish(&self) -> bool {
        self.finish.is_some()
    }

    pub(crate) fn complete(&mut self) -> ProviderEvent {
        ProviderEvent::RoundComplete {
            reason: self.finish.take().unwrap_or(FinishReason::Stop),
            usage: self.usage.take(),
        }
    }
}

/// Decode a stream of SSE `data` payloads into provider events, ending with one
/// `RoundComplete` at `[DONE]`.
pub(crate) fn decode_sse<S, E>(data: S) -> impl Stream<Item = anyhow::Result<ProviderEvent>> + Send
where
    S: Stream<Item = Result<String, E>> + Send + Unpin + 'static,
    E: Display + Send,
{
    let init = (data, ChunkDecoder::default(), VecDeque::new());
    stream::unfold(Some(init), |state| async move {
        let (mut data, mut decoder, mut queued) = state?;
        loop {
            if let Some(event) = queued.pop_front() {
                return Some((Ok(event), Some((data, decoder, queued))));
            }
            match data.next().await {
                Some(Ok(payload)) => {
                    let payload = payload.trim();
                    if payload.is_empty() {
                        continue;
                    }
                    if payload == "[DONE]" {
                        return Some((Ok(decoder.complete()), None));
                    }
                    match decoder.decode(payload) {
                        Ok(events) => queued.extend(events),
                        Err(e) => return Some((Err(e), None)),
                    }
                }
                Some(Err(e)) => return Some((Err(anyhow!("SSE stream error: {}", e)), None)),
                // Some servers close without [DONE] once they sent a finish reason.
                None if decoder.saw_finish() => return Some((Ok(decoder.complete()), None)),
                None => return Some((Err(anyhow!("SSE stream closed before response completed")), None)),
            }
        }
    })
}
