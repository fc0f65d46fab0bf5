use crate::conversation::Conversation;
use crate::error::StoreError;
use crate::types::Message;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as SlotMutex, OwnedMutexGuard};

/// In-memory conversation store keyed by conversation id.
///
/// Reads hand out snapshots. Writes go through [`ConversationStore::commit`],
/// which checks the snapshot version, or through the unconditional
/// [`set`](ConversationStore::set) / [`append`](ConversationStore::append).
#[derive(Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    slots: Mutex<HashMap<String, Arc<SlotMutex<()>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<String, Conversation>> {
        self.conversations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the conversation; an unknown id yields an empty one at
    /// version 0.
    pub fn get(&self, id: &str) -> Conversation {
        self.conversations()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Conversation::new(id))
    }

    /// Replace the message list. Returns the new version.
    pub fn set(&self, id: &str, messages: Vec<Message>) -> u64 {
        let mut map = self.conversations();
        let conv = map.entry(id.to_string()).or_insert_with(|| Conversation::new(id));
        conv.messages = messages;
        bump(conv)
    }

    /// Append one message. Returns the new version.
    #[allow(dead_code)]
    pub fn append(&self, id: &str, msg: Message) -> u64 {
        let mut map = self.conversations();
        let conv = map.entry(id.to_string()).or_insert_with(|| Conversation::new(id));
        conv.add_message(msg);
        bump(conv)
    }

    /// Write `snapshot` back if nobody else wrote since it was read.
    pub fn commit(&self, snapshot: &Conversation) -> Result<u64, StoreError> {
        let mut map = self.conversations();
        let found = map.get(&snapshot.id).map(|c| c.version).unwrap_or(0);
        if found != snapshot.version {
            return Err(StoreError::VersionConflict {
                id: snapshot.id.clone(),
                expected: snapshot.version,
                found,
            });
        }
        let mut next = snapshot.clone();
        let version = bump(&mut next);
        map.insert(snapshot.id.clone(), next);
        Ok(version)
    }

    /// Wait for the single execution slot of a conversation. Holding the guard
    /// keeps other turns for the same id out.
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.conversations().len()
    }
}

fn bump(conv: &mut Conversation) -> u64 {
    conv.version += 1;
    conv.updated_at = Utc::now();
    conv.version
}
