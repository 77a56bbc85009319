//! Conversation state and the streaming exchange with the provider

pub mod controller;
pub mod log;
pub mod session;

pub use controller::ChatController;
pub use log::{ConversationLog, Message, MessagePart, Role};
pub use session::{ChatSession, SEND_FAILURE_REPLY, SendOutcome};
