//! Configuration for the parley chat client
//!
//! Settings merge three layers, lowest precedence first: built-in defaults,
//! an optional `config.toml` under the platform config directory, and
//! environment variables (`GEMINI_API_KEY`, `PARLEY_*`).

use std::path::PathBuf;

use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Default chat completion model
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Default speech synthesis model
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Default prebuilt synthesis voice
pub const DEFAULT_TTS_VOICE: &str = "Kore";

/// Sample rate of synthesized audio (16-bit mono PCM)
pub const TTS_SAMPLE_RATE: u32 = 24_000;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the record store
    pub data_dir: PathBuf,

    /// Provider API key
    pub api_key: Option<SecretString>,

    /// Provider base URL override (testing and proxies)
    pub base_url: Option<String>,

    /// Chat completion settings
    pub chat: ChatConfig,

    /// Voice settings
    pub voice: VoiceConfig,
}

/// Chat completion settings
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.9,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 2048,
        }
    }
}

/// Voice settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speech synthesis model
    pub tts_model: String,

    /// Prebuilt voice identifier
    pub tts_voice: String,

    /// Synthesized audio sample rate
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
            sample_rate: TTS_SAMPLE_RATE,
        }
    }
}

/// Optional on-disk configuration file shape
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    #[serde(default)]
    chat: FileChatConfig,
    #[serde(default)]
    voice: FileVoiceConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileChatConfig {
    model: Option<String>,
    temperature: Option<f32>,
    top_k: Option<u32>,
    top_p: Option<f32>,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileVoiceConfig {
    tts_model: Option<String>,
    tts_voice: Option<String>,
}

impl Config {
    /// Load configuration from defaults, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the platform directories cannot be determined or the
    /// config file is present but malformed
    pub fn load() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "parley", "parley")
            .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;

        let file = {
            let path = dirs.config_dir().join("config.toml");
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                toml::from_str(&raw)?
            } else {
                FileConfig::default()
            }
        };

        let mut config = Self::merged(dirs.data_dir().to_path_buf(), file);

        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            config.api_key = Some(SecretString::from(key));
        }
        if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("PARLEY_CHAT_MODEL") {
            config.chat.model = model;
        }
        if let Ok(url) = std::env::var("PARLEY_BASE_URL") {
            config.base_url = Some(url);
        }
        if let Ok(voice) = std::env::var("PARLEY_TTS_VOICE") {
            config.voice.tts_voice = voice;
        }

        Ok(config)
    }

    fn merged(data_dir: PathBuf, file: FileConfig) -> Self {
        let chat_defaults = ChatConfig::default();
        let voice_defaults = VoiceConfig::default();

        Self {
            data_dir,
            api_key: file.api_key.map(SecretString::from),
            base_url: file.base_url,
            chat: ChatConfig {
                model: file.chat.model.unwrap_or(chat_defaults.model),
                temperature: file.chat.temperature.unwrap_or(chat_defaults.temperature),
                top_k: file.chat.top_k.unwrap_or(chat_defaults.top_k),
                top_p: file.chat.top_p.unwrap_or(chat_defaults.top_p),
                max_output_tokens: file
                    .chat
                    .max_output_tokens
                    .unwrap_or(chat_defaults.max_output_tokens),
            },
            voice: VoiceConfig {
                tts_model: file.voice.tts_model.unwrap_or(voice_defaults.tts_model),
                tts_voice: file.voice.tts_voice.unwrap_or(voice_defaults.tts_voice),
                sample_rate: voice_defaults.sample_rate,
            },
        }
    }

    /// Path of the record store database
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("parley.db")
    }

    /// A configuration with defaults only (for tests)
    #[must_use]
    pub fn for_tests() -> Self {
        Self::merged(PathBuf::from("."), FileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_provider_models() {
        let config = Config::for_tests();
        assert_eq!(config.chat.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.voice.tts_voice, DEFAULT_TTS_VOICE);
        assert_eq!(config.voice.sample_rate, 24_000);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            api_key = "test-key"

            [chat]
            model = "gemini-exp"
            temperature = 0.2

            [voice]
            tts_voice = "Puck"
            "#,
        )
        .unwrap();

        let config = Config::merged(PathBuf::from("/tmp"), file);
        assert!(config.api_key.is_some());
        assert_eq!(config.chat.model, "gemini-exp");
        assert!((config.chat.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.chat.top_k, 1);
        assert_eq!(config.voice.tts_voice, "Puck");
        assert_eq!(config.voice.tts_model, DEFAULT_TTS_MODEL);
    }

    #[test]
    fn store_path_is_under_data_dir() {
        let config = Config::for_tests();
        assert!(config.store_path().ends_with("parley.db"));
    }
}
