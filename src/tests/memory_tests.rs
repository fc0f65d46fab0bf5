use crate::memory::window_messages;
use crate::types::{Message, Role, ToolCall};

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(turns: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("S")];
        for i in 0..turns {
            messages.push(Message::user(format!("q{}", i)));
            messages.push(Message::assistant(format!("a{}", i)));
        }
        messages
    }

    #[test]
    fn test_short_history_is_unchanged() {
        let messages = conversation(2);
        assert_eq!(window_messages(&messages, 16), messages);
    }

    #[test]
    fn test_keeps_system_and_tail() {
        let messages = conversation(10);
        let window = window_messages(&messages, 4);

        assert_eq!(window.len(), 5);
        assert_eq!(window[0], Message::system("S"));
        let contents: Vec<&str> = window[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q8", "a8", "q9", "a9"]);
    }

    #[test]
    fn test_zero_keeps_only_system() {
        let window = window_messages(&conversation(3), 0);
        assert_eq!(window, vec![Message::system("S")]);
    }

    #[test]
    fn test_without_system_message() {
        let messages = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        let window = window_messages(&messages, 2);
        assert_eq!(window, messages[1..].to_vec());
    }

    #[test]
    fn test_orphaned_tool_results_are_dropped() {
        let messages = vec![
            Message::system("S"),
            Message::user("weather?"),
            Message::assistant_tool_calls("", vec![ToolCall::function("c1", "get_weather", "{}")]),
            Message::tool("c1", "get_weather", "{}"),
            Message::assistant("Sunny"),
        ];
        // The tail would start at the tool message.
        let window = window_messages(&messages, 2);
        let roles: Vec<Role> = window.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant]);

        let window = window_messages(&messages, 3);
        assert_eq!(window.len(), 4);
        assert!(window[1].tool_calls.is_some());
    }
}
