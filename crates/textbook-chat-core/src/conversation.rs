use anyhow::Result;
use std::sync::Arc;

use crate::state::Message;
use crate::store::{SessionStore, MESSAGES_KEY};

/// Ordered, append-only message history backed by session storage.
pub struct ConversationStore {
    store: Arc<dyn SessionStore>,
    messages: Vec<Message>,
}

impl ConversationStore {
    /// Restore the history persisted earlier in this session, if any.
    pub fn open(store: Arc<dyn SessionStore>) -> Self {
        let messages = Self::load(store.as_ref());
        Self { store, messages }
    }

    /// Read the persisted history. Missing or unreadable data yields an empty
    /// conversation rather than an error.
    pub fn load(store: &dyn SessionStore) -> Vec<Message> {
        let raw = match store.load(MESSAGES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read conversation history");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable conversation history");
            Vec::new()
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append to the end and persist the whole sequence.
    ///
    /// The in-memory history is updated even when persisting fails, so the
    /// conversation stays usable; the error is returned for the caller to log.
    pub fn append(&mut self, message: Message) -> Result<()> {
        self.messages.push(message);
        let serialized = serde_json::to_string(&self.messages)?;
        self.store.save(MESSAGES_KEY, &serialized)
    }

    /// Empty the history and drop the persisted copy.
    pub fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        self.store.clear(MESSAGES_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;
    use crate::store::MemoryStore;

    #[test]
    fn test_append_persists_in_order() {
        let store = Arc::new(MemoryStore::new());
        let mut conversation = ConversationStore::open(store.clone());

        conversation.append(Message::user("What is ROS 2?")).unwrap();
        conversation.append(Message::assistant("ROS 2 is...")).unwrap();

        let restored = ConversationStore::load(store.as_ref());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].role, Role::User);
        assert_eq!(restored[1].content, "ROS 2 is...");
        assert_eq!(restored, conversation.messages());
    }

    #[test]
    fn test_open_restores_previous_history() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut conversation = ConversationStore::open(store.clone());
            conversation.append(Message::user("first")).unwrap();
        }

        let conversation = ConversationStore::open(store);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].content, "first");
    }

    #[test]
    fn test_clear_removes_persisted_copy() {
        let store = Arc::new(MemoryStore::new());
        let mut conversation = ConversationStore::open(store.clone());
        conversation.append(Message::user("hello")).unwrap();

        conversation.clear().unwrap();

        assert!(conversation.is_empty());
        assert!(!store.contains(MESSAGES_KEY));
        assert!(ConversationStore::load(store.as_ref()).is_empty());
    }

    #[test]
    fn test_corrupt_history_loads_empty() {
        let store = MemoryStore::new();
        store.save(MESSAGES_KEY, "{not json").unwrap();
        assert!(ConversationStore::load(&store).is_empty());
    }
}
