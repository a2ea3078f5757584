//! Configuration management for the Kubic assistant
//!
//! Loaded once at startup and read-only afterwards. Changing it requires a
//! restart of the process.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

pub use file::ConfigFile;

/// Default Gradio endpoint serving the model on the board
const DEFAULT_REMOTE_URL: &str = "http://localhost:8080/";

/// Default endpoint name on the remote service
const DEFAULT_REMOTE_API: &str = "/get_RKLLM_output";

/// Default weather endpoint
const DEFAULT_WEATHER_URL: &str = "http://api.openweathermap.org/data/2.5/weather";

/// Response language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    /// Parse a language code; anything but "en" falls back to Spanish
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("en") {
            Self::En
        } else {
            Self::Es
        }
    }

    /// ISO code, as sent to weather lookups
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
        }
    }

    /// System prompt sent once at the start of a conversation
    #[must_use]
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::En => {
                "Always respond in English. Keep responses brief and concise. Use plain text only, no formatting, no lists, no markdown. If asked who you are, you are Kubic, an AI assistant."
            }
            Self::Es => {
                "Siempre responde en español. Respuestas breves y concisas. Solo texto plano, sin formato, sin listas, sin markdown. Si te pregunto quien eres, eres Kubic, un asistente de IA."
            }
        }
    }

    /// Acknowledgement spoken while a command is processed
    #[must_use]
    pub const fn thinking(self) -> &'static str {
        match self {
            Self::Es => "Pensando...",
            Self::En => "Thinking...",
        }
    }
}

/// Speech recognizer sidecar configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Recognizer executable
    pub command: String,

    /// Model directory passed to the recognizer
    pub model: PathBuf,
}

/// TTS engine and audio sink configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// TTS engine executable (piper)
    pub tts_command: String,

    /// TTS voice model
    pub tts_model: PathBuf,

    /// Audio sink executable (aplay)
    pub sink_command: String,

    /// Longest wait for playback after the last chunk
    pub playback_timeout: Duration,

    /// Acknowledgement tone
    pub beep_path: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_command: "./piper/piper".to_string(),
            tts_model: PathBuf::from("./piper/es_ES-sharvard-medium.onnx"),
            sink_command: "aplay".to_string(),
            playback_timeout: Duration::from_secs(30),
            beep_path: PathBuf::from("beep.wav"),
        }
    }
}

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrase, lowercased
    pub wake_word: String,

    /// Window after an accepted wake phrase during which new ones are ignored
    pub wake_cooldown: Duration,

    /// Silence allowed while listening for a command
    pub command_timeout: Duration,

    /// Whole-word wake matching instead of substring matching
    pub strict_wake_word: bool,

    /// Speak an acknowledgement before each answer
    pub think_aloud: bool,

    /// Input device selected in the config UI (informational)
    pub audio_input: Option<String>,

    /// ALSA card for output; `None` uses the default device
    pub audio_output: Option<String>,

    /// Response language
    pub language: Language,

    /// Remote inference service URL
    pub remote_endpoint: String,

    /// Endpoint name on the remote service
    pub remote_api_name: String,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// `OpenWeatherMap` API key
    pub weather_api_key: Option<String>,

    /// City for weather lookups
    pub city: Option<String>,

    /// Weather endpoint
    pub weather_endpoint: String,

    /// Recognizer sidecar
    pub recognizer: RecognizerConfig,

    /// TTS engine and sink
    pub speech: SpeechConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_word: "hola".to_string(),
            wake_cooldown: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
            strict_wake_word: false,
            think_aloud: true,
            audio_input: None,
            audio_output: None,
            language: Language::Es,
            remote_endpoint: DEFAULT_REMOTE_URL.to_string(),
            remote_api_name: DEFAULT_REMOTE_API.to_string(),
            system_prompt: None,
            weather_api_key: None,
            city: None,
            weather_endpoint: DEFAULT_WEATHER_URL.to_string(),
            recognizer: RecognizerConfig {
                command: "vosk-sidecar".to_string(),
                model: PathBuf::from("vosk-model-small-es-0.42"),
            },
            speech: SpeechConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration (env > file > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured duration is negative or not a number
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(
            || {
                std::env::var("KUBIC_CONFIG")
                    .map_or_else(|_| file::config_file_path(), PathBuf::from)
            },
            Path::to_path_buf,
        );

        let mut fc = file::load_config_file(&path);

        if let Ok(v) = std::env::var("KUBIC_WAKE_WORD") {
            fc.wake_word = Some(v);
        }
        if let Ok(v) = std::env::var("KUBIC_LANGUAGE") {
            fc.language = Some(v);
        }
        if let Ok(v) = std::env::var("KUBIC_REMOTE_URL") {
            fc.rkllm_api_url = Some(v);
        }
        if let Ok(v) = std::env::var("OPENWEATHERMAP_API_KEY") {
            fc.openweathermap_key = Some(v);
        }

        Self::from_record(fc)
    }

    /// Build a configuration from a persisted record
    ///
    /// # Errors
    ///
    /// Returns error if a configured duration is negative or not a number
    pub fn from_record(fc: ConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let wake_word = fc
            .wake_word
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .unwrap_or(defaults.wake_word);

        let speech_defaults = defaults.speech;
        let speech = SpeechConfig {
            tts_command: fc.speech.tts_command.unwrap_or(speech_defaults.tts_command),
            tts_model: fc
                .speech
                .tts_model
                .map_or(speech_defaults.tts_model, PathBuf::from),
            sink_command: fc
                .speech
                .sink_command
                .unwrap_or(speech_defaults.sink_command),
            playback_timeout: seconds(
                "speech.playback_timeout",
                fc.speech.playback_timeout,
                speech_defaults.playback_timeout,
            )?,
            beep_path: fc
                .speech
                .beep_path
                .map_or(speech_defaults.beep_path, PathBuf::from),
        };

        Ok(Self {
            wake_word,
            wake_cooldown: seconds("wake_cooldown", fc.wake_cooldown, defaults.wake_cooldown)?,
            command_timeout: seconds(
                "command_timeout",
                fc.command_timeout,
                defaults.command_timeout,
            )?,
            strict_wake_word: fc.strict_wake_word.unwrap_or(defaults.strict_wake_word),
            think_aloud: fc.think_aloud.unwrap_or(defaults.think_aloud),
            audio_input: fc.audio_input.and_then(file::DeviceId::into_identifier),
            audio_output: fc.audio_output.and_then(file::DeviceId::into_identifier),
            language: fc
                .language
                .as_deref()
                .map_or(defaults.language, Language::from_code),
            remote_endpoint: non_empty(fc.rkllm_api_url).unwrap_or(defaults.remote_endpoint),
            remote_api_name: non_empty(fc.rkllm_api_name).unwrap_or(defaults.remote_api_name),
            system_prompt: non_empty(fc.system_prompt),
            weather_api_key: non_empty(fc.openweathermap_key),
            city: non_empty(fc.location_city),
            weather_endpoint: non_empty(fc.weather_endpoint).unwrap_or(defaults.weather_endpoint),
            recognizer: RecognizerConfig {
                command: fc.recognizer.command.unwrap_or(defaults.recognizer.command),
                model: fc
                    .recognizer
                    .model
                    .map_or(defaults.recognizer.model, PathBuf::from),
            },
            speech,
        })
    }

    /// System prompt for the remote conversation
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or_else(|| self.language.system_prompt())
    }
}

/// Config UI stores empty form fields as ""
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn seconds(key: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::Config(format!("{key} must be a non-negative number: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_board_setup() {
        let config = Config::from_record(ConfigFile::default()).unwrap();

        assert_eq!(config.wake_word, "hola");
        assert_eq!(config.wake_cooldown, Duration::from_secs(2));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.language, Language::Es);
        assert_eq!(config.remote_endpoint, DEFAULT_REMOTE_URL);
        assert!(config.weather_api_key.is_none());
    }

    #[test]
    fn test_record_overrides() {
        let fc = ConfigFile {
            wake_word: Some("  Oye Kubic ".to_string()),
            wake_cooldown: Some(1.5),
            language: Some("en".to_string()),
            openweathermap_key: Some(String::new()),
            location_city: Some("Sevilla".to_string()),
            ..ConfigFile::default()
        };
        let config = Config::from_record(fc).unwrap();

        assert_eq!(config.wake_word, "oye kubic");
        assert_eq!(config.wake_cooldown, Duration::from_millis(1500));
        assert_eq!(config.language, Language::En);
        assert!(config.weather_api_key.is_none());
        assert_eq!(config.city.as_deref(), Some("Sevilla"));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let fc = ConfigFile {
            command_timeout: Some(-1.0),
            ..ConfigFile::default()
        };
        assert!(matches!(Config::from_record(fc), Err(Error::Config(_))));
    }

    #[test]
    fn test_system_prompt_follows_language() {
        let mut config = Config::default();
        assert!(config.system_prompt().starts_with("Siempre responde"));

        config.language = Language::En;
        assert!(config.system_prompt().starts_with("Always respond"));

        config.system_prompt = Some("Be terse.".to_string());
        assert_eq!(config.system_prompt(), "Be terse.");
    }
}
