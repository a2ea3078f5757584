//! Error types for the Kubic assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture or output device missing
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech recognizer failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Remote call could not be started
    #[error("remote submission failed: {0}")]
    RemoteSubmission(String),

    /// Remote stream failed after it started
    #[error("remote stream interrupted: {0}")]
    RemoteStream(String),

    /// Update from the remote service had an unexpected shape
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// TTS engine or audio sink failure
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}
