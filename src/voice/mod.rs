//! Voice processing
//!
//! Speech output (synthesis, PCM decoding, sequential playback) and speech
//! input (microphone capture, endpointing, transcription). Both are
//! best-effort enhancements: their failures are logged and degrade to a
//! text-only session, never to a user-facing error.

pub mod listen;
pub mod playback;

pub use listen::{CAPTURE_SAMPLE_RATE, ListenEvent, Microphone, SpeechCapture, SpeechListener};
pub use playback::{AudioClip, AudioOutput, Speaker, Timeline, decode_base64};
