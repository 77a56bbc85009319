//! Ordered message log with an explicit streaming tail
//!
//! Messages are append-only, except the last model message while a reply is
//! streaming: the log keeps an "open tail" index and only that message's text
//! may grow, monotonically, until the tail is closed.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One fragment of a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub text: String,
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<MessagePart>,
    /// RFC 3339 creation time
    pub timestamp: String,
}

impl Message {
    /// Create a user message stamped with the current time
    #[must_use]
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart {
                text: text.to_string(),
            }],
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Create a model message stamped with the current time
    #[must_use]
    pub fn model(text: &str) -> Self {
        Self {
            role: Role::Model,
            parts: vec![MessagePart {
                text: text.to_string(),
            }],
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// The message body, concatenated across parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

/// The ordered conversation log
///
/// Owned exclusively by one [`ChatSession`](crate::chat::ChatSession);
/// never shared across users.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    open_tail: Option<usize>,
}

impl ConversationLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a log from persisted messages; the tail starts closed
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            open_tail: None,
        }
    }

    /// All messages, in chronological order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a finalized user message
    pub fn push_user(&mut self, text: &str) {
        self.messages.push(Message::user(text));
    }

    /// Append an empty model message and open it for streaming
    ///
    /// Any previously open tail is closed first; there is at most one open
    /// tail at a time.
    pub fn open_model_tail(&mut self) {
        self.open_tail = Some(self.messages.len());
        self.messages.push(Message::model(""));
    }

    /// Grow the open tail's text by `delta`
    ///
    /// Returns `false` (and changes nothing) when no tail is open.
    pub fn append_delta(&mut self, delta: &str) -> bool {
        let Some(index) = self.open_tail else {
            return false;
        };
        if let Some(part) = self
            .messages
            .get_mut(index)
            .and_then(|m| m.parts.first_mut())
        {
            part.text.push_str(delta);
            return true;
        }
        false
    }

    /// Close the streaming tail; further deltas are rejected
    pub fn close_tail(&mut self) {
        self.open_tail = None;
    }

    /// Whether a model message is currently open for streaming
    #[must_use]
    pub fn tail_open(&self) -> bool {
        self.open_tail.is_some()
    }

    /// Replace the streaming tail with a fixed failure message
    ///
    /// If a tail is open its partial content is discarded and overwritten;
    /// otherwise a fresh model message carrying `text` is appended. Either
    /// way the tail ends closed.
    pub fn fail_tail(&mut self, text: &str) {
        match self.open_tail.take() {
            Some(index) => {
                if let Some(message) = self.messages.get_mut(index) {
                    message.parts = vec![MessagePart {
                        text: text.to_string(),
                    }];
                }
            }
            None => self.messages.push(Message::model(text)),
        }
    }

    /// The text of the last message, if any
    #[must_use]
    pub fn last_text(&self) -> Option<String> {
        self.messages.last().map(Message::text)
    }

    /// Drop every message and close the tail
    pub fn clear(&mut self) {
        self.messages.clear();
        self.open_tail = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_grow_the_open_tail() {
        let mut log = ConversationLog::new();
        log.push_user("hi");
        log.open_model_tail();

        assert!(log.append_delta("Hel"));
        assert!(log.append_delta("lo"));
        log.close_tail();

        assert_eq!(log.len(), 2);
        assert_eq!(log.last_text().as_deref(), Some("Hello"));
    }

    #[test]
    fn delta_after_close_is_rejected() {
        let mut log = ConversationLog::new();
        log.open_model_tail();
        log.close_tail();

        assert!(!log.append_delta("late"));
        assert_eq!(log.last_text().as_deref(), Some(""));
    }

    #[test]
    fn fail_replaces_partial_content() {
        let mut log = ConversationLog::new();
        log.open_model_tail();
        log.append_delta("half a rep");
        log.fail_tail("something went wrong");

        assert_eq!(log.len(), 1);
        assert_eq!(log.last_text().as_deref(), Some("something went wrong"));
        assert!(!log.tail_open());
    }

    #[test]
    fn fail_without_tail_appends() {
        let mut log = ConversationLog::new();
        log.push_user("hi");
        log.fail_tail("something went wrong");

        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[1].role, Role::Model);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = Message::user("hey");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["parts"][0]["text"], "hey");
    }

    #[test]
    fn restored_log_has_closed_tail() {
        let log = ConversationLog::from_messages(vec![Message::model("old")]);
        assert!(!log.tail_open());
        assert_eq!(log.len(), 1);
    }
}
