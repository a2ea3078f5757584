//! Streaming speech recognition
//!
//! The recognizer runs as a sidecar process. Communication is JSON lines over
//! stdin/stdout: every `{"audio": "<base64 PCM16LE>"}` request gets exactly one
//! reply, `{"text": "..."}` once an utterance is final or `{"partial": "..."}`
//! while it is still in progress. `{"reset": true}` clears recognizer state and
//! gets no reply.

use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{AudioFrame, SAMPLE_RATE};
use crate::config::RecognizerConfig;
use crate::{Error, Result};

/// Result of feeding one frame to a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// In-progress guess, may still change
    Partial(String),
    /// Completed utterance
    Final(String),
    /// Nothing recognized for this frame
    Nothing,
}

/// Streaming recognizer capability
#[async_trait]
pub trait Transcriber: Send {
    /// Feed one frame and report what the recognizer has so far
    async fn feed(&mut self, frame: &AudioFrame) -> Result<Recognition>;

    /// Discard any partially recognized utterance
    async fn reset(&mut self) -> Result<()>;
}

#[derive(Deserialize)]
struct SidecarReply {
    text: Option<String>,
    partial: Option<String>,
}

/// Recognizer backed by a sidecar process
pub struct SidecarTranscriber {
    name: &'static str,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl SidecarTranscriber {
    /// Spawn a recognizer sidecar
    ///
    /// `name` only labels log output ("wake", "command").
    ///
    /// # Errors
    ///
    /// Returns error if the model directory is missing or the process cannot
    /// be spawned
    pub fn spawn(config: &RecognizerConfig, name: &'static str) -> Result<Self> {
        if !config.model.exists() {
            return Err(Error::Config(format!(
                "recognizer model not found at {} (download one from https://alphacephei.com/vosk/models)",
                config.model.display()
            )));
        }

        let mut child = Command::new(&config.command)
            .arg("--model")
            .arg(&config.model)
            .arg("--sample-rate")
            .arg(SAMPLE_RATE.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Recognition(format!("failed to spawn {}: {e}", config.command))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Recognition("recognizer stdin not available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Recognition("recognizer stdout not available".to_string()))?;

        tracing::debug!(
            name,
            command = %config.command,
            model = %config.model.display(),
            "recognizer sidecar started"
        );

        Ok(Self {
            name,
            child,
            stdin,
            stdout: BufReader::new(stdout),
            line: String::new(),
        })
    }

    async fn send(&mut self, request: &serde_json::Value) -> Result<()> {
        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');
        self.stdin
            .write_all(&payload)
            .await
            .map_err(|e| {
                Error::Recognition(format!("{} recognizer write failed: {e}", self.name))
            })?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::Recognition(format!("{} recognizer flush failed: {e}", self.name)))
    }
}

#[async_trait]
impl Transcriber for SidecarTranscriber {
    async fn feed(&mut self, frame: &AudioFrame) -> Result<Recognition> {
        let audio = base64::engine::general_purpose::STANDARD.encode(frame.to_le_bytes());
        self.send(&serde_json::json!({ "audio": audio })).await?;

        self.line.clear();
        let read = self
            .stdout
            .read_line(&mut self.line)
            .await
            .map_err(|e| Error::Recognition(format!("{} recognizer read failed: {e}", self.name)))?;

        if read == 0 {
            let status = self.child.try_wait().ok().flatten();
            return Err(Error::Recognition(format!(
                "{} recognizer exited ({status:?})",
                self.name
            )));
        }

        parse_reply(&self.line)
    }

    async fn reset(&mut self) -> Result<()> {
        self.send(&serde_json::json!({ "reset": true })).await
    }
}

/// Interpret one sidecar reply line
fn parse_reply(line: &str) -> Result<Recognition> {
    let reply: SidecarReply = serde_json::from_str(line.trim())
        .map_err(|e| Error::Recognition(format!("unexpected recognizer reply: {e}")))?;

    if let Some(text) = reply.text {
        return Ok(Recognition::Final(text.trim().to_string()));
    }

    match reply.partial {
        Some(partial) if !partial.trim().is_empty() => {
            Ok(Recognition::Partial(partial.trim().to_string()))
        }
        _ => Ok(Recognition::Nothing),
    }
}
