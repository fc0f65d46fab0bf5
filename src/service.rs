use crate::agent::{Agent, TurnEvent, TurnStream};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::memory::window_messages;
use crate::store::ConversationStore;
use crate::types::{Message, TurnResult};
use crate::usage::{TurnMetrics, UsageSink, estimate_cost_usd};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

/// Conversation-level front of the turn driver: memory, persistence and
/// metrics around each turn.
pub struct ChatService {
    store: Arc<ConversationStore>,
    agent: Agent,
    sink: Arc<dyn UsageSink>,
    system_prompt: String,
    memory_messages: usize,
}

impl ChatService {
    pub fn new(
        store: Arc<ConversationStore>,
        agent: Agent,
        sink: Arc<dyn UsageSink>,
        system_prompt: impl Into<String>,
        memory_messages: usize,
    ) -> Self {
        Self {
            store,
            agent,
            sink,
            system_prompt: system_prompt.into(),
            memory_messages,
        }
    }

    pub fn from_config(config: &Config, store: Arc<ConversationStore>, agent: Agent, sink: Arc<dyn UsageSink>) -> Self {
        Self::new(store, agent, sink, config.system_prompt.clone(), config.memory_messages)
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Record the user message and start a turn for it.
    ///
    /// The returned stream holds the conversation's execution slot until it
    /// finishes or is dropped. Messages produced by the turn are committed
    /// only once the turn completes.
    pub async fn chat(&self, conversation_id: &str, user_message: &str) -> Result<TurnStream, TurnError> {
        let slot = self.store.acquire(conversation_id).await;

        let mut conv = self.store.get(conversation_id);
        if conv.is_empty() {
            conv.add_message(Message::system(self.system_prompt.as_str()));
        }
        conv.add_message(Message::user(user_message));
        conv.version = self.store.commit(&conv)?;

        let window = window_messages(&conv.messages, self.memory_messages);
        info!(
            conversation_id,
            stored = conv.messages.len(),
            window = window.len(),
            conversations = self.store.len(),
            "starting turn"
        );

        let pending = PendingCommit {
            store: self.store.clone(),
            sink: self.sink.clone(),
            model: self.agent.options().model.clone(),
            window_len: window.len(),
            conv,
            _slot: slot,
        };
        let turn = self.agent.run_turn(window);

        Ok(Box::pin(stream::unfold(Some((turn, pending)), |state| async move {
            let (mut turn, pending) = state?;
            match turn.next().await? {
                Ok(TurnEvent::Done(result)) => match pending.commit(&result) {
                    Ok(()) => Some((Ok(TurnEvent::Done(result)), None)),
                    Err(e) => Some((Err(e), None)),
                },
                Ok(event) => Some((Ok(event), Some((turn, pending)))),
                Err(e) => {
                    warn!(conversation_id = %pending.conv.id, error = %e, "turn failed, nothing committed");
                    Some((Err(e), None))
                }
            }
        })))
    }
}

/// What a running turn needs to publish its result.
struct PendingCommit {
    store: Arc<ConversationStore>,
    sink: Arc<dyn UsageSink>,
    model: String,
    /// Length of the history handed to the driver; everything past it in the
    /// result is new.
    window_len: usize,
    conv: Conversation,
    _slot: OwnedMutexGuard<()>,
}

impl PendingCommit {
    fn commit(mut self, result: &TurnResult) -> Result<(), TurnError> {
        let added = result.messages.get(self.window_len..).unwrap_or_default();
        self.conv.extend_messages(added.iter().cloned());
        let version = self.store.commit(&self.conv)?;

        let latency_ms = result.elapsed.as_millis() as u64;
        info!(
            conversation_id = %self.conv.id,
            version,
            added = added.len(),
            latency_ms,
            "turn committed"
        );

        self.sink.record(TurnMetrics {
            conversation_id: self.conv.id.clone(),
            ts: Utc::now(),
            model: self.model.clone(),
            latency_ms,
            prompt_tokens: result.usage.prompt_tokens,
            completion_tokens: result.usage.completion_tokens,
            cost_usd_est: estimate_cost_usd(&self.model, result.usage),
            tool_calls: result.tool_calls.clone(),
        });
        Ok(())
    }
}
