//! Typed key schema for the record store

use std::fmt;

/// Every kind of record the client persists, with its namespacing
///
/// The rendered strings are the stable on-disk schema; changing them
/// orphans existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey<'a> {
    /// Plaintext password for a registered username
    Credentials(&'a str),
    /// JSON `{username}` of the logged-in user, absent when logged out
    CurrentUser,
    /// JSON array of messages for a user's conversation
    ChatHistory(&'a str),
    /// JSON boolean: speech output preference for a user
    TtsEnabled(&'a str),
    /// `"light"` or `"dark"`
    Theme,
}

impl fmt::Display for RecordKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials(username) => write!(f, "credentials_{username}"),
            Self::CurrentUser => write!(f, "currentUser"),
            Self::ChatHistory(username) => write!(f, "chatHistory_{username}"),
            Self::TtsEnabled(username) => write!(f, "ttsEnabled_{username}"),
            Self::Theme => write!(f, "theme"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_to_schema_strings() {
        assert_eq!(RecordKey::Credentials("alice").to_string(), "credentials_alice");
        assert_eq!(RecordKey::CurrentUser.to_string(), "currentUser");
        assert_eq!(RecordKey::ChatHistory("alice").to_string(), "chatHistory_alice");
        assert_eq!(RecordKey::TtsEnabled("alice").to_string(), "ttsEnabled_alice");
        assert_eq!(RecordKey::Theme.to_string(), "theme");
    }
}
