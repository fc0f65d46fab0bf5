use crate::types::{Message, Role};

/// Keep the system message plus the last `max_messages` non-system messages.
/// `max_messages == 0` leaves only the system message.
///
/// Tool results whose requesting assistant message fell outside the window are
/// dropped from the head as well, since providers reject orphaned tool
/// messages.
pub fn window_messages(messages: &[Message], max_messages: usize) -> Vec<Message> {
    let system = messages.iter().find(|m| m.role == Role::System);
    let rest: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

    let start = rest.len().saturating_sub(max_messages);
    let tail = rest[start..]
        .iter()
        .skip_while(|m| m.role == Role::Tool)
        .map(|m| (*m).clone());

    system.cloned().into_iter().chain(tail).collect()
}
