use crate::provider::{CompletionProvider, CompletionRequest, EventStream, FinishReason, ProviderEvent};
use crate::types::{Message, Usage};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub enum Scripted {
    Event(ProviderEvent),
    Fail(String),
}

/// Provider that replays pre-recorded rounds and remembers what it was sent.
#[derive(Clone, Default)]
pub struct MockProvider {
    rounds: Arc<Mutex<VecDeque<Vec<Scripted>>>>,
    call_history: Arc<Mutex<Vec<Vec<Message>>>>,
    events_pulled: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_round(&mut self, events: Vec<ProviderEvent>) {
        self.rounds
            .lock()
            .unwrap()
            .push_back(events.into_iter().map(Scripted::Event).collect());
    }

    pub fn add_text_response(&mut self, content: &str) {
        self.add_round(vec![
            ProviderEvent::Text(content.to_string()),
            stop(None),
        ]);
    }

    pub fn add_tool_call_response(&mut self, id: &str, tool_name: &str, args: &str) {
        self.add_round(vec![
            tool_fragment(id, Some(tool_name), Some(args)),
            ProviderEvent::RoundComplete {
                reason: FinishReason::ToolCalls,
                usage: None,
            },
        ]);
    }

    /// A round that emits `before` and then fails with `error_msg`.
    pub fn add_error_response(&mut self, before: Vec<ProviderEvent>, error_msg: &str) {
        let mut round: Vec<Scripted> = before.into_iter().map(Scripted::Event).collect();
        round.push(Scripted::Fail(error_msg.to_string()));
        self.rounds.lock().unwrap().push_back(round);
    }

    pub fn get_call_history(&self) -> Vec<Vec<Message>> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn events_pulled(&self) -> usize {
        self.events_pulled.load(Ordering::SeqCst)
    }

    fn pop_round(&self) -> Vec<Scripted> {
        self.rounds.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![
                Scripted::Event(ProviderEvent::Text("No more mock responses configured".to_string())),
                Scripted::Event(stop(None)),
            ]
        })
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn stream(&self, request: CompletionRequest<'_>) -> Result<EventStream> {
        // Store the call for verification
        self.call_history.lock().unwrap().push(request.messages.to_vec());

        let pulled = self.events_pulled.clone();
        let events = stream::iter(self.pop_round()).map(move |scripted| {
            pulled.fetch_add(1, Ordering::SeqCst);
            match scripted {
                Scripted::Event(event) => Ok(event),
                Scripted::Fail(msg) => Err(anyhow::anyhow!(msg)),
            }
        });
        Ok(Box::pin(events))
    }

    fn label(&self) -> &str {
        "scripted"
    }
}

pub fn tool_fragment(id: &str, name: Option<&str>, args: Option<&str>) -> ProviderEvent {
    ProviderEvent::ToolCallFragment {
        id: id.to_string(),
        name: name.map(str::to_string),
        arguments: args.map(str::to_string),
    }
}

pub fn stop(usage: Option<Usage>) -> ProviderEvent {
    ProviderEvent::RoundComplete {
        reason: FinishReason::Stop,
        usage,
    }
}

pub fn tool_calls_done(usage: Option<Usage>) -> ProviderEvent {
    ProviderEvent::RoundComplete {
        reason: FinishReason::ToolCalls,
        usage,
    }
}
