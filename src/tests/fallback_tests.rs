use crate::agent::{Agent, AgentOptions, collect_turn};
use crate::config::SYSTEM_PROMPT;
use crate::fallback::{FallbackProvider, HELP_TEXT, KB_MISS, NO_EARLIER_MESSAGE};
use crate::service::ChatService;
use crate::store::ConversationStore;
use crate::tool_registry::ToolRegistry;
use crate::types::{Message, Role, TurnResult};
use crate::usage::{MockUsageSink, UsageSink};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_agent() -> Agent {
        let provider = FallbackProvider::new().with_fragment_delay(Duration::ZERO);
        Agent::new(Arc::new(provider), ToolRegistry::new(), AgentOptions::default())
    }

    fn offline_service() -> ChatService {
        let mut sink = MockUsageSink::new();
        sink.expect_record().returning(|_| ());
        let sink: Arc<dyn UsageSink> = Arc::new(sink);
        ChatService::new(Arc::new(ConversationStore::new()), offline_agent(), sink, SYSTEM_PROMPT, 16)
    }

    async fn ask(service: &ChatService, conversation_id: &str, text: &str) -> (String, TurnResult) {
        let turn = service.chat(conversation_id, text).await.unwrap();
        let (fragments, result) = collect_turn(turn).await.unwrap();
        (fragments.concat(), result)
    }

    #[tokio::test]
    async fn test_weather_in_dallas() {
        let service = offline_service();
        let (streamed, result) = ask(&service, "w", "What is the weather in Dallas?").await;

        assert_eq!(streamed, "Weather for Dallas: Sunny, 27°C.");
        assert_eq!(result.reply(), Some(streamed.as_str()));
        assert_eq!(result.rounds, 2);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "get_weather");
        assert_eq!(result.tool_calls[0].args["city"], "Dallas");
        assert!(result.usage.prompt_tokens >= 1);
        assert!(result.usage.completion_tokens >= 1);
    }

    #[tokio::test]
    async fn test_office_hours_from_kb() {
        let service = offline_service();
        let (streamed, result) = ask(&service, "kb", "What are the office hours?").await;

        assert_eq!(streamed, "Mon–Thu 2–4pm, Room 301");
        assert_eq!(result.tool_calls[0].name, "lookup_kb");
        assert_eq!(result.tool_calls[0].args["query"], "office hours");

        let stored = service.store().get("kb");
        let tool_msg = stored.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.name.as_deref(), Some("lookup_kb"));
        let assistant = stored.messages.iter().find(|m| m.tool_calls.is_some()).unwrap();
        assert_eq!(
            tool_msg.tool_call_id.as_deref(),
            Some(assistant.tool_calls.as_ref().unwrap()[0].id.as_str())
        );
    }

    #[tokio::test]
    async fn test_recall_without_and_with_earlier_message() {
        let service = offline_service();

        let (streamed, result) = ask(&service, "r", "Repeat what I asked earlier.").await;
        assert_eq!(streamed, NO_EARLIER_MESSAGE);
        assert!(result.tool_calls.is_empty());

        let (_, _) = ask(&service, "r2", "hello there").await;
        let (streamed, _) = ask(&service, "r2", "What did I ask before? Repeat it.").await;
        assert_eq!(streamed, "You previously asked: hello there");
    }

    #[tokio::test]
    async fn test_help_and_summary() {
        let service = offline_service();

        let (streamed, _) = ask(&service, "h", "hi").await;
        assert_eq!(streamed, HELP_TEXT);

        let (streamed, _) = ask(&service, "h", "Please summarize this short note").await;
        assert_eq!(streamed, "Summary: Please summarize this short note");
    }

    #[tokio::test]
    async fn test_fragments_are_small() {
        let history = vec![Message::system(SYSTEM_PROMPT), Message::user("hi")];
        let (fragments, result) = collect_turn(offline_agent().run_turn(history)).await.unwrap();

        assert!(fragments.len() > 1);
        assert!(fragments.iter().all(|f| f.chars().count() <= 24));
        assert_eq!(Some(fragments.concat().as_str()), result.reply());
    }

    #[tokio::test]
    async fn test_tool_error_answer() {
        // The weather tool without a usable city argument still produces an answer.
        let history = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user("weather"),
            Message::assistant_tool_calls(
                "",
                vec![crate::types::ToolCall::function("c1", "get_weather", "{}")],
            ),
            Message::tool("c1", "get_weather", r#"{"error":"Tool get_weather failed"}"#),
        ];
        let (fragments, _) = collect_turn(offline_agent().run_turn(history)).await.unwrap();
        assert_eq!(
            fragments.concat(),
            "Sorry, the get_weather tool failed: Tool get_weather failed"
        );
    }

    #[tokio::test]
    async fn test_kb_miss_answer() {
        let history = vec![
            Message::user("contact?"),
            Message::tool("c1", "lookup_kb", r#"{"query":"x","results":{"note":"no match"}}"#),
        ];
        let (fragments, _) = collect_turn(offline_agent().run_turn(history)).await.unwrap();
        assert_eq!(fragments.concat(), KB_MISS);
    }
}
