//! Gemini REST client: streaming chat, speech synthesis, transcription

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ChatProvider, DeltaStream, LiveChat};
use crate::chat::log::{Message, Role};
use crate::config::Config;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Harm categories blocked at medium and above for every chat request
const SAFETY_SETTINGS: [SafetySetting; 4] = [
    SafetySetting {
        category: "HARM_CATEGORY_HARASSMENT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_HATE_SPEECH",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_DANGEROUS_CONTENT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        default,
        rename = "inlineData",
        skip_serializing_if = "Option::is_none"
    )]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceSelection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection {
    prebuilt_voice_config: PrebuiltVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoice {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(
        rename = "generationConfig",
        skip_serializing_if = "Option::is_none"
    )]
    generation_config: Option<GenerationConfig>,
    #[serde(rename = "safetySettings", skip_serializing_if = "Option::is_none")]
    safety_settings: Option<Vec<SafetySetting>>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }

    /// Inline audio payload of the first candidate
    fn inline_audio(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        content
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref().map(|d| d.data.clone()))
    }
}

/// The payload of an SSE line, if it is a data line
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Extract the text delta carried by one SSE event payload
fn event_delta(payload: &str) -> Result<Option<String>> {
    let response: GenerateResponse = serde_json::from_str(payload)
        .map_err(|e| Error::Stream(format!("malformed stream event: {e}")))?;
    Ok(response.text())
}

/// Explicitly constructed Gemini client, injected into the components that
/// talk to the provider
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    chat_model: String,
    tts_model: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(config: &Config) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            return Err(Error::Config(
                "Gemini API key required (set GEMINI_API_KEY)".to_string(),
            ));
        };

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: config.chat.model.clone(),
            tts_model: config.voice.tts_model.clone(),
            generation: GenerationConfig {
                temperature: Some(config.chat.temperature),
                top_k: Some(config.chat.top_k),
                top_p: Some(config.chat.top_p),
                max_output_tokens: Some(config.chat.max_output_tokens),
                ..GenerationConfig::default()
            },
        })
    }

    fn url(&self, model: &str, streaming: bool) -> String {
        if streaming {
            format!(
                "{}/models/{model}:streamGenerateContent?alt=sse",
                self.base_url
            )
        } else {
            format!("{}/models/{model}:generateContent", self.base_url)
        }
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .http
            .post(self.url(model, false))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("Gemini error {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn open_chat(&self, history: &[Message]) -> Result<Box<dyn LiveChat>> {
        let contents = history.iter().map(content_from_message).collect();
        tracing::debug!(turns = history.len(), "opened chat from replayed history");

        Ok(Box::new(GeminiChat {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            url: self.url(&self.chat_model, true),
            generation: self.generation.clone(),
            contents: Arc::new(Mutex::new(contents)),
        }))
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Option<String>> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part::text(text)],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO"]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceSelection {
                        prebuilt_voice_config: PrebuiltVoice {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
                ..GenerationConfig::default()
            }),
            safety_settings: None,
        };

        let response = self.generate(&self.tts_model, &request).await?;
        Ok(response.inline_audio())
    }

    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        use base64::Engine as _;

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::text(
                        "Transcribe this English speech exactly. \
                         Reply with only the transcript, nothing else.",
                    ),
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "audio/wav".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(wav),
                        }),
                    },
                ],
            }],
            generation_config: None,
            safety_settings: None,
        };

        let response = self.generate(&self.chat_model, &request).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::Stt("transcription reply carried no text".to_string()))
    }
}

fn content_from_message(message: &Message) -> Content {
    Content {
        role: match message.role {
            Role::User => "user".to_string(),
            Role::Model => "model".to_string(),
        },
        parts: message
            .parts
            .iter()
            .map(|p| Part::text(&p.text))
            .collect(),
    }
}

/// One live conversation; holds the turn history the provider API expects
/// replayed on every request
struct GeminiChat {
    http: reqwest::Client,
    api_key: SecretString,
    url: String,
    generation: GenerationConfig,
    contents: Arc<Mutex<Vec<Content>>>,
}

#[async_trait]
impl LiveChat for GeminiChat {
    async fn send(&mut self, text: &str) -> Result<DeltaStream> {
        let contents = {
            let mut guard = self
                .contents
                .lock()
                .map_err(|_| Error::Provider("chat history lock poisoned".to_string()))?;
            guard.push(Content {
                role: "user".to_string(),
                parts: vec![Part::text(text)],
            });
            guard.clone()
        };

        let request = GenerateRequest {
            contents,
            generation_config: Some(self.generation.clone()),
            safety_settings: Some(SAFETY_SETTINGS.to_vec()),
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("Gemini error {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        let contents = Arc::clone(&self.contents);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut reply = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Stream(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Complete lines only; multi-byte characters never split
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let line = line.trim_end();

                    let Some(payload) = sse_data(line) else {
                        continue;
                    };
                    match event_delta(payload) {
                        Ok(Some(delta)) => {
                            reply.push_str(&delta);
                            if tx.send(Ok(delta)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended cleanly: the reply becomes a model turn
            if let Ok(mut guard) = contents.lock() {
                guard.push(Content {
                    role: "model".to_string(),
                    parts: vec![Part::text(&reply)],
                });
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
