//! Parley - voice-enabled AI chat client for the terminal
//!
//! This library provides the core of the parley client:
//! - Local record store (credentials, history, preferences)
//! - Conversation session with streaming replies
//! - Speech output (synthesis, PCM decode, sequential playback)
//! - Speech input (capture, endpointing, transcription)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                Terminal REPL                     │
//! └───────────────────────┬─────────────────────────┘
//!                         │
//! ┌───────────────────────▼─────────────────────────┐
//! │               ChatController                     │
//! │  Session │ Speaker │ SpeechCapture │ Prefs      │
//! └─────┬──────────┬───────────┬─────────────┬──────┘
//!       │          │           │             │
//! ┌─────▼──────────▼───────────▼──────┐ ┌────▼─────┐
//! │      Gemini provider client        │ │  Record  │
//! │  chat stream │ TTS │ transcription │ │  store   │
//! └────────────────────────────────────┘ └──────────┘
//! ```

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod provider;
pub mod store;
pub mod voice;

pub use auth::{Accounts, AuthError, User};
pub use chat::{ChatController, ChatSession, Message, Role, SEND_FAILURE_REPLY, SendOutcome};
pub use config::Config;
pub use error::{Error, Result};
pub use provider::{ChatProvider, DeltaStream, GeminiClient, LiveChat};
pub use store::{RecordKey, RecordStore, Theme};
pub use voice::{ListenEvent, Speaker, SpeechCapture, Timeline};
