//! Presentation-facing controller
//!
//! One small surface wiring the UI to the conversation session and the
//! auxiliary voice components. The UI calls down; capture notifications
//! come back on the event channel returned at construction.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chat::log::Message;
use crate::chat::session::{ChatSession, SendOutcome};
use crate::config::VoiceConfig;
use crate::provider::ChatProvider;
use crate::store::{Preferences, RecordStore, Theme};
use crate::voice::{ListenEvent, Speaker, SpeechCapture};
use crate::Result;

/// Wires the UI layer to the session, speaker and speech bridge
pub struct ChatController {
    session: ChatSession,
    prefs: Preferences,
    provider: Arc<dyn ChatProvider>,
    voice: VoiceConfig,
    capture: SpeechCapture,
    speaker: Option<Arc<Speaker>>,
}

impl ChatController {
    /// Build the controller for a logged-in user
    ///
    /// Returns the controller and the receiver for capture notifications.
    ///
    /// # Errors
    ///
    /// Returns error if the record store cannot be read
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: RecordStore,
        voice: VoiceConfig,
        username: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ListenEvent>)> {
        let mut session = ChatSession::new(Arc::clone(&provider), store.clone(), username)?;
        let prefs = Preferences::new(store);

        // The audio pipeline exists only while speech output is on
        let speaker = if prefs.tts_enabled(username)? {
            match Speaker::new(Arc::clone(&provider), &voice) {
                Ok(speaker) => Some(Arc::new(speaker)),
                Err(e) => {
                    tracing::warn!(error = %e, "speech output unavailable, disabling");
                    prefs.set_tts_enabled(username, false)?;
                    None
                }
            }
        } else {
            None
        };
        session.set_speaker(speaker.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capture = SpeechCapture::detect(Arc::clone(&provider), events_tx);

        Ok((
            Self {
                session,
                prefs,
                provider,
                voice,
                capture,
                speaker,
            },
            events_rx,
        ))
    }

    /// Send one message; see [`ChatSession::send`]
    ///
    /// # Errors
    ///
    /// Returns error only if persisting the log fails
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        self.session.send(text).await
    }

    /// Send one message, observing streamed fragments
    ///
    /// # Errors
    ///
    /// Returns error only if persisting the log fails
    pub async fn send_message_with<F>(&mut self, text: &str, on_delta: F) -> Result<SendOutcome>
    where
        F: FnMut(&str),
    {
        self.session.send_with(text, on_delta).await
    }

    #[must_use]
    pub fn current_log(&self) -> &[Message] {
        self.session.log()
    }

    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.session.is_sending()
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.session.username()
    }

    /// Begin a capture session; returns `false` when the host has no
    /// speech input capability
    pub fn start_listening(&self) -> bool {
        match &self.capture {
            SpeechCapture::Available(listener) => {
                listener.start();
                true
            }
            SpeechCapture::Unavailable => false,
        }
    }

    /// End the current capture session early
    pub fn stop_listening(&self) {
        if let SpeechCapture::Available(listener) = &self.capture {
            listener.stop();
        }
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        match &self.capture {
            SpeechCapture::Available(listener) => listener.is_listening(),
            SpeechCapture::Unavailable => false,
        }
    }

    #[must_use]
    pub const fn speech_input_available(&self) -> bool {
        self.capture.is_available()
    }

    /// Whether spoken replies are currently enabled
    ///
    /// # Errors
    ///
    /// Returns error if the record store cannot be read
    pub fn speech_output_enabled(&self) -> Result<bool> {
        self.prefs.tts_enabled(self.session.username())
    }

    /// Flip the speech output preference, creating the audio pipeline on
    /// first enable
    ///
    /// Returns the new state; enabling reports `false` when no usable
    /// output device exists.
    ///
    /// # Errors
    ///
    /// Returns error if the preference cannot be persisted
    pub fn toggle_speech_output(&mut self) -> Result<bool> {
        let username = self.session.username().to_string();
        let enable = !self.prefs.tts_enabled(&username)?;

        if enable && self.speaker.is_none() {
            match Speaker::new(Arc::clone(&self.provider), &self.voice) {
                Ok(speaker) => self.speaker = Some(Arc::new(speaker)),
                Err(e) => {
                    tracing::warn!(error = %e, "speech output unavailable");
                    self.prefs.set_tts_enabled(&username, false)?;
                    return Ok(false);
                }
            }
        }

        self.prefs.set_tts_enabled(&username, enable)?;
        self.session
            .set_speaker(if enable { self.speaker.clone() } else { None });
        Ok(enable)
    }

    /// Clear the conversation, its persisted history and any queued audio
    ///
    /// # Errors
    ///
    /// Returns error if the record store write fails
    pub fn new_chat(&mut self) -> Result<()> {
        self.session.clear()
    }

    /// The saved theme
    ///
    /// # Errors
    ///
    /// Returns error if the record store cannot be read
    pub fn theme(&self) -> Result<Theme> {
        self.prefs.theme()
    }

    /// Flip and persist the theme, returning the new value
    ///
    /// # Errors
    ///
    /// Returns error if the record store write fails
    pub fn toggle_theme(&self) -> Result<Theme> {
        let theme = self.prefs.theme()?.toggled();
        self.prefs.set_theme(theme)?;
        Ok(theme)
    }
}
