use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Snapshot of one conversation as held by the store.
///
/// `version` counts successful writes; a commit made from a stale snapshot is
/// rejected.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            messages: Vec::<Message>::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // Append one message
    pub fn add_message(&mut self, msg: Message) {
        self.messages.push(msg);
        self.updated_at = Utc::now();
    }

    // Append everything a turn produced
    pub fn extend_messages(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
        self.updated_at = Utc::now();
    }
}
