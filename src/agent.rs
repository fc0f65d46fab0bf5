use crate::error::TurnError;
use crate::provider::{CompletionProvider, CompletionRequest, EventStream, FinishReason, ProviderEvent};
use crate::tool_registry::{ToolRegistry, error_result};
use crate::types::{JsonMap, Message, ToolCall, ToolCallRecord, TurnResult, Usage};
use futures::stream::{self, Stream, StreamExt};
use indexmap::IndexMap;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct AgentOptions {
    pub model: String,
    pub temperature: f32,
    /// Upper bound on provider rounds per turn. `None` keeps calling the
    /// provider until it stops asking for tools.
    pub max_rounds: Option<usize>,
    /// Longest wait for the next provider event.
    pub step_timeout: Option<Duration>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_rounds: None,
            step_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TurnEvent {
    /// Reply text, forwarded as soon as the provider produces it.
    Text(String),
    /// Always the last item of a successful turn.
    Done(TurnResult),
}

/// Lazy output of one turn. Polling drives the provider; dropping the stream
/// abandons the turn without publishing any history.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent, TurnError>> + Send>>;

#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn CompletionProvider>,
    tools: ToolRegistry,
    opts: AgentOptions,
}

impl Agent {
    pub fn new(provider: Arc<dyn CompletionProvider>, tools: ToolRegistry, opts: AgentOptions) -> Self {
        Self { provider, tools, opts }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.opts
    }

    pub fn provider_label(&self) -> &str {
        self.provider.label()
    }

    /// Run one turn over `history`, which should already end with the new
    /// user message.
    pub fn run_turn(&self, history: Vec<Message>) -> TurnStream {
        let driver = TurnDriver::new(self, history);
        Box::pin(stream::unfold(Some(driver), |state| async move {
            let mut driver = state?;
            match driver.next_event().await {
                Ok(TurnEvent::Done(result)) => Some((Ok(TurnEvent::Done(result)), None)),
                Ok(event) => Some((Ok(event), Some(driver))),
                Err(e) => {
                    warn!(round = driver.rounds, error = %e, "turn failed");
                    Some((Err(e), None))
                }
            }
        }))
    }
}

/// Drain a turn, returning the text fragments in order and the final result.
pub async fn collect_turn(mut turn: TurnStream) -> Result<(Vec<String>, TurnResult), TurnError> {
    let mut fragments = Vec::new();
    while let Some(event) = turn.next().await {
        match event? {
            TurnEvent::Text(fragment) => fragments.push(fragment),
            TurnEvent::Done(result) => return Ok((fragments, result)),
        }
    }
    Err(TurnError::Provider(anyhow::anyhow!("turn ended without a result")))
}

#[derive(Default)]
struct PendingCall {
    name: String,
    arguments: String,
}

enum Phase {
    /// Ask the provider for the next round.
    Request,
    Streaming(EventStream),
    Dispatch,
    Done,
}

struct TurnDriver {
    provider: Arc<dyn CompletionProvider>,
    tools: ToolRegistry,
    opts: AgentOptions,
    history: Vec<Message>,
    phase: Phase,
    /// Assistant text of the current round.
    text: String,
    /// Tool calls of the current round, in first-seen order.
    pending: IndexMap<String, PendingCall>,
    records: Vec<ToolCallRecord>,
    usage: Usage,
    rounds: usize,
    started: Instant,
}

impl TurnDriver {
    fn new(agent: &Agent, history: Vec<Message>) -> Self {
        Self {
            provider: agent.provider.clone(),
            tools: agent.tools.clone(),
            opts: agent.opts.clone(),
            history,
            phase: Phase::Request,
            text: String::new(),
            pending: IndexMap::new(),
            records: Vec::new(),
            usage: Usage::default(),
            rounds: 0,
            started: Instant::now(),
        }
    }

    async fn next_event(&mut self) -> Result<TurnEvent, TurnError> {
        loop {
            match &mut self.phase {
                Phase::Request => self.begin_round().await?,
                Phase::Streaming(events) => {
                    let next = match self.opts.step_timeout {
                        Some(limit) => timeout(limit, events.next())
                            .await
                            .map_err(|_| TurnError::Timeout(limit))?,
                        None => events.next().await,
                    };
                    match next {
                        Some(Ok(ProviderEvent::Text(fragment))) => {
                            if fragment.is_empty() {
                                continue;
                            }
                            self.text.push_str(&fragment);
                            return Ok(TurnEvent::Text(fragment));
                        }
                        Some(Ok(ProviderEvent::ToolCallFragment { id, name, arguments })) => {
                            self.accumulate(id, name, arguments)
                        }
                        Some(Ok(ProviderEvent::RoundComplete { reason, usage })) => {
                            self.end_round(reason, usage)
                        }
                        Some(Err(e)) => return Err(TurnError::Provider(e)),
                        // A stream that just ends is a plain stop.
                        None => self.end_round(FinishReason::Stop, None),
                    }
                }
                Phase::Dispatch => self.dispatch().await,
                Phase::Done => return Ok(TurnEvent::Done(self.finish())),
            }
        }
    }

    async fn begin_round(&mut self) -> Result<(), TurnError> {
        if let Some(max) = self.opts.max_rounds {
            if self.rounds >= max {
                return Err(TurnError::RoundLimit(max));
            }
        }
        self.rounds += 1;
        self.text.clear();
        self.pending.clear();
        debug!(round = self.rounds, messages = self.history.len(), "requesting completion");

        let request = CompletionRequest {
            model: &self.opts.model,
            temperature: self.opts.temperature,
            messages: &self.history,
            tools: self.tools.schemas(),
        };
        // Opening the stream counts as a step too; a backend may never send headers.
        let opened = match self.opts.step_timeout {
            Some(limit) => timeout(limit, self.provider.stream(request))
                .await
                .map_err(|_| TurnError::Timeout(limit))?,
            None => self.provider.stream(request).await,
        };
        let events = opened.map_err(TurnError::Provider)?;
        self.phase = Phase::Streaming(events);
        Ok(())
    }

    fn accumulate(&mut self, id: String, name: Option<String>, arguments: Option<String>) {
        let entry = self.pending.entry(id).or_default();
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(fragment) = arguments {
            entry.arguments.push_str(&fragment);
        }
    }

    fn end_round(&mut self, reason: FinishReason, usage: Option<Usage>) {
        if let Some(reported) = usage {
            self.usage.merge_max(reported);
        }
        if !self.pending.is_empty() {
            self.phase = Phase::Dispatch;
            return;
        }
        if reason == FinishReason::ToolCalls {
            warn!(round = self.rounds, "round ended with tool_calls but none were sent");
        }
        self.phase = Phase::Done;
    }

    async fn dispatch(&mut self) {
        let calls: Vec<ToolCall> = self
            .pending
            .drain(..)
            .map(|(id, call)| ToolCall::function(id, call.name, call.arguments))
            .collect();

        let mut tool_messages = Vec::with_capacity(calls.len());
        for call in &calls {
            let (args, result) = run_tool(&self.tools, call).await;
            tool_messages.push(Message::tool(
                &call.id,
                &call.function.name,
                Value::Object(result.clone()).to_string(),
            ));
            self.records.push(ToolCallRecord {
                name: call.function.name.clone(),
                args,
                result,
            });
        }

        self.history
            .push(Message::assistant_tool_calls(std::mem::take(&mut self.text), calls));
        self.history.extend(tool_messages);
        self.phase = Phase::Request;
    }

    fn finish(&mut self) -> TurnResult {
        let text = std::mem::take(&mut self.text);
        if !text.trim().is_empty() {
            self.history.push(Message::assistant(text));
        }
        let result = TurnResult {
            messages: std::mem::take(&mut self.history),
            tool_calls: std::mem::take(&mut self.records),
            usage: self.usage,
            elapsed: self.started.elapsed(),
            rounds: self.rounds,
        };
        info!(
            rounds = result.rounds,
            tool_calls = result.tool_calls.len(),
            prompt_tokens = result.usage.prompt_tokens,
            completion_tokens = result.usage.completion_tokens,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "turn finished"
        );
        result
    }
}

async fn run_tool(tools: &ToolRegistry, call: &ToolCall) -> (JsonMap, JsonMap) {
    let tools = tools.clone();
    let name = call.function.name.clone();
    let raw = call.function.arguments.clone();
    match tokio::task::spawn_blocking(move || tools.dispatch(&name, &raw)).await {
        Ok(outcome) => outcome,
        Err(e) => (
            JsonMap::new(),
            error_result(format!("Tool {} failed", call.function.name), Some(e.to_string())),
        ),
    }
}
