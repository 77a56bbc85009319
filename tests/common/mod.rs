//! Shared test utilities: in-memory store and a scripted provider

// Not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use parley::chat::Message;
use parley::provider::{ChatProvider, DeltaStream, LiveChat};
use parley::store::{self, RecordStore};
use parley::{Error, Result};

/// Set up an in-memory record store
#[must_use]
pub fn memory_store() -> RecordStore {
    store::open_memory().expect("failed to open in-memory store")
}

/// One scripted provider reply, consumed per `send`
#[derive(Clone)]
pub enum ScriptedReply {
    /// Stream these chunks, then end cleanly
    Chunks(Vec<&'static str>),
    /// Stream these chunks, then fail mid-stream
    StreamError(Vec<&'static str>),
    /// Fail before any chunk is produced
    RequestError,
}

/// Scripted stand-in for the hosted provider
pub struct ScriptedProvider {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    /// Histories passed to `open_chat`, in call order
    pub opened: Arc<Mutex<Vec<Vec<Message>>>>,
    /// Turn texts passed to `send`, in call order
    pub sent: Arc<Mutex<Vec<String>>>,
    /// Texts passed to `synthesize`
    pub synthesized: Arc<Mutex<Vec<String>>>,
    /// Transcript returned by `transcribe`
    pub transcript: String,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(replies: Vec<ScriptedReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Arc::new(Mutex::new(replies.into())),
            opened: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            synthesized: Arc::new(Mutex::new(Vec::new())),
            transcript: "hello from the microphone".to_string(),
        })
    }

    /// Number of times a chat was opened
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn open_chat(&self, history: &[Message]) -> Result<Box<dyn LiveChat>> {
        self.opened.lock().unwrap().push(history.to_vec());
        Ok(Box::new(ScriptedChat {
            replies: Arc::clone(&self.replies),
            sent: Arc::clone(&self.sent),
        }))
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Option<String>> {
        self.synthesized.lock().unwrap().push(text.to_string());
        Ok(None)
    }

    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        Ok(self.transcript.clone())
    }
}

struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LiveChat for ScriptedChat {
    async fn send(&mut self, text: &str) -> Result<DeltaStream> {
        self.sent.lock().unwrap().push(text.to_string());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedReply::Chunks(Vec::new()));

        match reply {
            ScriptedReply::Chunks(chunks) => {
                let items: Vec<Result<String>> =
                    chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            ScriptedReply::StreamError(chunks) => {
                let mut items: Vec<Result<String>> =
                    chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                items.push(Err(Error::Stream("scripted stream failure".to_string())));
                Ok(Box::pin(stream::iter(items)))
            }
            ScriptedReply::RequestError => {
                Err(Error::Provider("scripted request failure".to_string()))
            }
        }
    }
}
