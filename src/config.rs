use crate::agent::AgentOptions;
use anyhow::{Context, bail};
use std::env;
use std::time::Duration;

pub const SYSTEM_PROMPT: &str = "You are a helpful, safe task-oriented assistant. \
     Use tools when needed. Keep responses concise and factual. \
     If you don't know, say so.";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MEMORY_MESSAGES: usize = 16;
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 60;

/// Runtime settings, read from the environment once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub mock_mode: bool,
    pub temperature: f32,
    pub memory_messages: usize,
    pub max_rounds: Option<usize>,
    pub step_timeout: Duration,
    pub system_prompt: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mock_mode = lookup("MOCK_MODE").is_some_and(|v| v.trim() == "1");
        let api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if !mock_mode && api_key.is_none() {
            bail!("OPENAI_API_KEY not set (set MOCK_MODE=1 to run without a backend)");
        }

        // Unparsable temperatures fall back to the default instead of failing.
        let temperature = lookup("CHAT_TEMP")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let memory_messages = match lookup("MEMORY_MESSAGES") {
            Some(v) => v.trim().parse().context("MEMORY_MESSAGES must be a non-negative integer")?,
            None => DEFAULT_MEMORY_MESSAGES,
        };

        let max_rounds = match lookup("MAX_ROUNDS") {
            Some(v) if !v.trim().is_empty() => {
                Some(v.trim().parse().context("MAX_ROUNDS must be a positive integer")?)
            }
            _ => None,
        };

        let step_timeout_secs = match lookup("STEP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse().context("STEP_TIMEOUT_SECS must be an integer")?,
            None => DEFAULT_STEP_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            mock_mode,
            temperature,
            memory_messages,
            max_rounds,
            step_timeout: Duration::from_secs(step_timeout_secs),
            system_prompt: SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_rounds: self.max_rounds,
            step_timeout: Some(self.step_timeout),
        }
    }
}
