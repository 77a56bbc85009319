//! Persisted conversation history, one JSON record per user

use super::{RecordKey, RecordStore};
use crate::Result;
use crate::chat::log::Message;

/// Chat history records layered on the key-value store
#[derive(Clone)]
pub struct ChatHistory {
    store: RecordStore,
}

impl ChatHistory {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Load a user's saved conversation, or an empty one
    ///
    /// A record that fails to parse is treated as absent rather than
    /// poisoning the session.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub fn load(&self, username: &str) -> Result<Vec<Message>> {
        let Some(raw) = self.store.get(&RecordKey::ChatHistory(username))? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!(username, error = %e, "discarding unreadable chat history");
                Ok(Vec::new())
            }
        }
    }

    /// Persist a user's conversation; empty logs are not written
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the store write fails
    pub fn save(&self, username: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let raw = serde_json::to_string(messages)?;
        self.store.set(&RecordKey::ChatHistory(username), &raw)
    }

    /// Erase a user's saved conversation
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn erase(&self, username: &str) -> Result<()> {
        self.store.remove(&RecordKey::ChatHistory(username))
    }
}
