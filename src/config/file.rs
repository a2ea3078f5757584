//! Persisted configuration record
//!
//! The record is shared with the configuration web UI, which writes
//! `config.json`. All fields are optional; the file is a partial overlay on
//! top of defaults. A `.toml` path is read as TOML with the same keys.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Schema of the persisted configuration record
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigFile {
    /// Wake phrase (e.g. "hola")
    pub wake_word: Option<String>,

    /// Seconds during which a repeated wake phrase is ignored
    pub wake_cooldown: Option<f64>,

    /// Seconds of silence before an unfinished command is abandoned
    pub command_timeout: Option<f64>,

    /// Require the wake phrase to align on word boundaries
    pub strict_wake_word: Option<bool>,

    /// Speak a short acknowledgement before answering
    pub think_aloud: Option<bool>,

    /// Input device written by the config UI (index or name)
    pub audio_input: Option<DeviceId>,

    /// ALSA card used for output
    pub audio_output: Option<DeviceId>,

    /// Response language code ("es" or "en")
    pub language: Option<String>,

    /// Remote inference service URL
    pub rkllm_api_url: Option<String>,

    /// Endpoint name on the remote service
    pub rkllm_api_name: Option<String>,

    /// Override for the language's default system prompt
    pub system_prompt: Option<String>,

    /// `OpenWeatherMap` API key
    pub openweathermap_key: Option<String>,

    /// City used for weather lookups
    pub location_city: Option<String>,

    /// Weather endpoint override
    pub weather_endpoint: Option<String>,

    /// Recognizer sidecar configuration
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// Speech output configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Device identifier, stored by the config UI as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    Index(u64),
    Name(String),
}

impl DeviceId {
    /// Identifier as passed to audio tools; blank names count as unset
    #[must_use]
    pub fn into_identifier(self) -> Option<String> {
        match self {
            Self::Index(i) => Some(i.to_string()),
            Self::Name(name) => {
                let name = name.trim();
                (!name.is_empty()).then(|| name.to_string())
            }
        }
    }
}

/// Speech recognizer sidecar
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RecognizerFileConfig {
    pub command: Option<String>,
    pub model: Option<String>,
}

/// TTS engine and audio sink
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SpeechFileConfig {
    pub tts_command: Option<String>,
    pub tts_model: Option<String>,
    pub sink_command: Option<String>,
    pub playback_timeout: Option<f64>,
    pub beep_path: Option<String>,
}

/// Load the configuration record from `path`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: &Path) -> ConfigFile {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config(path, &content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Parse a record, choosing the format from the file extension
///
/// # Errors
///
/// Returns error if the content is not valid JSON (or TOML for `.toml` paths)
pub fn parse_config(path: &Path, content: &str) -> crate::Result<ConfigFile> {
    if path.extension().is_some_and(|ext| ext == "toml") {
        Ok(toml::from_str(content)?)
    } else {
        Ok(serde_json::from_str(content)?)
    }
}

/// Resolve the config file path
///
/// `./config.json` wins when present (the config UI writes it next to the
/// assistant), otherwise `~/.config/kubic/config.json`.
pub fn config_file_path() -> PathBuf {
    let local = PathBuf::from("config.json");
    if local.exists() {
        return local;
    }

    directories::BaseDirs::new().map_or(local, |d| {
        d.config_dir().join("kubic").join("config.json")
    })
}
