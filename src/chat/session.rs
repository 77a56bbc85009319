//! The conversation session: ordered log plus the live provider exchange

use std::sync::Arc;

use futures::StreamExt;

use super::log::ConversationLog;
use crate::chat::log::Message;
use crate::provider::{ChatProvider, LiveChat};
use crate::store::{ChatHistory, Preferences, RecordStore};
use crate::voice::Speaker;
use crate::{Error, Result};

/// Fixed user-visible text shown when a send fails for any reason
pub const SEND_FAILURE_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// What `send` did with the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The turn ran (successfully or to the fixed failure reply)
    Sent,
    /// Blank input, or another send was already in flight
    Ignored,
}

/// Owns the conversation log and the streaming exchange for one user
///
/// At most one send is in flight at a time; the flag is checked on entry and
/// released on every exit path. The live provider handle is created lazily,
/// exactly once per login, by replaying the prior log.
pub struct ChatSession {
    username: String,
    provider: Arc<dyn ChatProvider>,
    history: ChatHistory,
    prefs: Preferences,
    speaker: Option<Arc<Speaker>>,
    log: ConversationLog,
    live: Option<Box<dyn LiveChat>>,
    in_flight: bool,
}

impl ChatSession {
    /// Open the session for `username`, restoring any persisted log
    ///
    /// # Errors
    ///
    /// Returns error if the record store cannot be read
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: RecordStore,
        username: &str,
    ) -> Result<Self> {
        let history = ChatHistory::new(store.clone());
        let messages = history.load(username)?;
        tracing::debug!(username, restored = messages.len(), "session opened");

        Ok(Self {
            username: username.to_string(),
            provider,
            history,
            prefs: Preferences::new(store),
            speaker: None,
            log: ConversationLog::from_messages(messages),
            live: None,
            in_flight: false,
        })
    }

    /// Attach (or detach) the speech output pipeline
    pub fn set_speaker(&mut self, speaker: Option<Arc<Speaker>>) {
        self.speaker = speaker;
    }

    /// The conversation so far, in order
    #[must_use]
    pub fn log(&self) -> &[Message] {
        self.log.messages()
    }

    /// Whether a send is currently in flight
    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send one user turn and stream the reply into the log
    ///
    /// Provider failures never escape: the log ends the turn with the fixed
    /// failure reply instead. `on_delta` observes each streamed fragment as
    /// it lands in the log.
    ///
    /// # Errors
    ///
    /// Returns error only if persisting the log to the record store fails
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        self.send_with(text, |_| {}).await
    }

    /// [`send`](Self::send) with a delta observer
    ///
    /// # Errors
    ///
    /// Returns error only if persisting the log to the record store fails
    pub async fn send_with<F>(&mut self, text: &str, on_delta: F) -> Result<SendOutcome>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() || self.in_flight {
            return Ok(SendOutcome::Ignored);
        }

        self.in_flight = true;
        let turn = self.run_turn(text, on_delta).await;
        self.in_flight = false;

        match turn {
            Ok(reply) => self.hand_off_speech(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "send failed");
                self.log.fail_tail(SEND_FAILURE_REPLY);
            }
        }

        self.history.save(&self.username, self.log.messages())?;
        Ok(SendOutcome::Sent)
    }

    /// Empty the log, drop the live handle, erase persisted history, and
    /// stop any in-flight audio
    ///
    /// # Errors
    ///
    /// Returns error if erasing the persisted history fails
    pub fn clear(&mut self) -> Result<()> {
        self.log.clear();
        self.live = None;
        self.history.erase(&self.username)?;
        if let Some(speaker) = &self.speaker {
            speaker.stop_all();
        }
        tracing::info!(username = %self.username, "conversation cleared");
        Ok(())
    }

    async fn run_turn<F>(&mut self, text: &str, mut on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        self.log.push_user(text);

        if self.live.is_none() {
            // Replay everything before the turn just appended
            let prior = &self.log.messages()[..self.log.len() - 1];
            let handle = self.provider.open_chat(prior).await?;
            self.live = Some(handle);
        }
        let Some(live) = self.live.as_mut() else {
            return Err(Error::Provider("live chat handle missing".to_string()));
        };

        let mut stream = live.send(text).await?;
        self.log.open_model_tail();

        let mut reply = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            reply.push_str(&delta);
            self.log.append_delta(&delta);
            on_delta(&delta);
        }
        self.log.close_tail();

        Ok(reply)
    }

    /// Fire-and-forget hand-off of a completed reply to the speech pipeline
    fn hand_off_speech(&self, reply: &str) {
        if reply.is_empty() {
            return;
        }
        let Some(speaker) = &self.speaker else {
            return;
        };
        match self.prefs.tts_enabled(&self.username) {
            Ok(true) => {
                let speaker = Arc::clone(speaker);
                let reply = reply.to_string();
                tokio::spawn(async move {
                    speaker.speak(&reply).await;
                });
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "could not read speech preference"),
        }
    }
}
