//! Outbound provider interface
//!
//! The hosted model is an external collaborator reached through three calls:
//! a streaming chat completion, a one-shot speech synthesis, and a one-shot
//! audio transcription. Components receive an explicitly constructed client
//! behind these traits; there is no process-wide singleton, and tests swap in
//! scripted fakes.

mod gemini;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;
use crate::chat::log::Message;

pub use gemini::GeminiClient;

/// An async sequence of partial assistant text
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The hosted generative-AI provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a stateful chat from replayed history (roles, parts and order
    /// pass through unchanged)
    async fn open_chat(&self, history: &[Message]) -> Result<Box<dyn LiveChat>>;

    /// Synthesize speech for `text` with the given voice
    ///
    /// Returns the provider's base64-encoded 16-bit mono PCM payload, or
    /// `Ok(None)` when the reply carries no audio.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Option<String>>;

    /// Transcribe a single WAV utterance to text
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// A provider-side conversational context carrying turn history, so each
/// call sends only the new turn
#[async_trait]
pub trait LiveChat: Send {
    /// Issue one turn and stream the reply's text deltas
    async fn send(&mut self, text: &str) -> Result<DeltaStream>;
}
