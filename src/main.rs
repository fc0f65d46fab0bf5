use anyhow::bail;
use futures::StreamExt;
use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod agent;
mod config;
mod conversation;
mod error;
mod eval;
mod fallback;
mod llm_client;
mod memory;
mod provider;
mod service;
mod store;
mod tool_registry;
mod tools;
mod types;
mod usage;

#[cfg(test)]
mod mocks;
#[cfg(test)]
mod tests;

use agent::{Agent, TurnEvent};
use config::Config;
use fallback::FallbackProvider;
use llm_client::LlmClient;
use provider::CompletionProvider;
use service::ChatService;
use store::ConversationStore;
use tool_registry::ToolRegistry;
use usage::TracingUsageSink;

fn init_tracing() {
    // Logs go to stderr so they never interleave with streamed replies.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "taskchat=info".into()))
        .with_writer(io::stderr)
        .init();
}

fn build_service(config: &Config) -> anyhow::Result<ChatService> {
    let provider: Arc<dyn CompletionProvider> = match (&config.api_key, config.mock_mode) {
        (_, true) => Arc::new(FallbackProvider::new()),
        (Some(key), false) => Arc::new(LlmClient::new(config.base_url.clone(), key.clone())?),
        (None, false) => bail!("OPENAI_API_KEY not set"),
    };
    let tools = ToolRegistry::new();
    tracing::info!(provider = provider.label(), model = %config.model, tools = ?tools.names(), "provider ready");

    let agent = Agent::new(provider, tools, config.agent_options());
    Ok(ChatService::from_config(
        config,
        Arc::new(ConversationStore::new()),
        agent,
        Arc::new(TracingUsageSink),
    ))
}

async fn chat_once(service: &ChatService, conversation_id: &str, input: &str) -> anyhow::Result<()> {
    let mut turn = service.chat(conversation_id, input).await?;
    let mut stdout = io::stdout();
    while let Some(event) = turn.next().await {
        match event? {
            TurnEvent::Text(fragment) => {
                print!("{}", fragment);
                stdout.flush()?;
            }
            TurnEvent::Done(result) => {
                println!();
                for call in &result.tool_calls {
                    let status = if call.is_error() { " failed" } else { "" };
                    println!(
                        "\u{001b}[35m▌🔧 {} ({}){}\u{001b}[0m",
                        call.name,
                        serde_json::Value::Object(call.args.clone()),
                        status
                    );
                }
                println!("\u{001b}[90m[latency_ms={}]\u{001b}[0m", result.elapsed.as_millis());
            }
        }
    }
    Ok(())
}

async fn repl(service: &ChatService) -> anyhow::Result<()> {
    println!("\u{001b}[94mHello welcome to taskchat !\u{001b}[0m");
    let mut conversation_id = Uuid::new_v4().to_string();

    loop {
        print!("\u{001b}[93mYou:\u{001b}[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        match input.trim() {
            "" => continue,
            "quit" => break,
            "help" => println!("Type a message to chat, 'new' for a fresh conversation, 'clear' to forget this one, 'quit' to exit."),
            "clear" => {
                service.store().set(&conversation_id, Vec::new());
                println!("\u{001b}[90m(history cleared)\u{001b}[0m");
            }
            "new" => {
                conversation_id = Uuid::new_v4().to_string();
                println!("\u{001b}[90m(new conversation {})\u{001b}[0m", conversation_id);
            }
            text => {
                print!("\u{001b}[96mAgent:\u{001b}[0m ");
                if let Err(e) = chat_once(service, &conversation_id, text).await {
                    eprintln!("\nError: {}", e);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    let service = build_service(&config)?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => repl(&service).await,
        Some("eval") => {
            let tasks = args.get(1).map(String::as_str).unwrap_or("eval/tasks.json");
            eval::run(&service, Path::new(tasks), Path::new("results")).await?;
            Ok(())
        }
        Some(other) => bail!("unknown command '{}'; usage: taskchat [eval <tasks.json>]", other),
    }
}
