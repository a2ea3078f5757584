//! Remote dialogue client
//!
//! Keeps the conversation history and streams answers from the remote
//! inference service. The service reports progress as snapshots (the whole
//! answer so far); the client turns them into deltas so speech synthesis only
//! receives new text.

mod gradio;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{Config, Error, Result};

pub use gradio::GradioBackend;

/// Buffered deltas between the network task and the consumer
const DELTA_BUFFER: usize = 64;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Stream of full-answer-so-far snapshots
///
/// `Err(Error::MalformedSnapshot)` items are skipped by the client; any other
/// error ends the answer.
pub type SnapshotStream = BoxStream<'static, Result<String>>;

/// Wire adapter for a remote inference service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Submit the ordered message list and stream back answer snapshots
    async fn submit(&self, messages: Vec<ConversationTurn>) -> Result<SnapshotStream>;
}

/// Derives deltas from a snapshot stream
#[derive(Debug, Default, Clone)]
pub struct DeltaTracker {
    last_seen: String,
}

impl DeltaTracker {
    /// New text in `snapshot`, if it extends what was seen so far
    ///
    /// Repeated, shrinking or diverging snapshots yield nothing.
    pub fn advance(&mut self, snapshot: &str) -> Option<String> {
        if snapshot.len() <= self.last_seen.len() || !snapshot.starts_with(&self.last_seen) {
            return None;
        }

        let delta = snapshot[self.last_seen.len()..].to_string();
        self.last_seen = snapshot.to_string();
        Some(delta)
    }

    /// Accepted text so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.last_seen
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.last_seen
    }
}

#[derive(Debug, Default)]
struct Conversation {
    history: Vec<ConversationTurn>,
    system_prompt_sent: bool,
}

/// Conversation with the remote model
#[derive(Clone)]
pub struct DialogueClient {
    backend: Arc<dyn InferenceBackend>,
    system_prompt: Option<String>,
    conversation: Arc<Mutex<Conversation>>,
}

impl DialogueClient {
    /// Create a client over any backend
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>, system_prompt: Option<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.filter(|p| !p.is_empty()),
            conversation: Arc::new(Mutex::new(Conversation::default())),
        }
    }

    /// Create a client for the configured Gradio endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = GradioBackend::new(&config.remote_endpoint, &config.remote_api_name)?;
        tracing::info!(url = %config.remote_endpoint, "remote dialogue client ready");
        Ok(Self::new(
            Arc::new(backend),
            Some(config.system_prompt().to_string()),
        ))
    }

    /// Send a user message and stream the answer as deltas
    ///
    /// Failures arrive as a single diagnostic delta. History is updated only
    /// when the answer completes cleanly, before the stream ends.
    #[must_use]
    pub fn send(&self, user_text: &str) -> BoxStream<'static, String> {
        let messages = self.outgoing_messages(user_text);
        let (tx, rx) = mpsc::channel(DELTA_BUFFER);
        let backend = Arc::clone(&self.backend);
        let conversation = Arc::clone(&self.conversation);
        let user_text = user_text.to_string();

        tokio::spawn(async move {
            let mut snapshots = match backend.submit(messages).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    tracing::error!(error = %e, "failed to submit request");
                    let _ = tx.send(format!("Error submitting request: {e}")).await;
                    return;
                }
            };

            let mut tracker = DeltaTracker::default();
            while let Some(update) = snapshots.next().await {
                match update {
                    Ok(snapshot) => {
                        if let Some(delta) = tracker.advance(&snapshot)
                            && tx.send(delta).await.is_err()
                        {
                            tracing::debug!("answer consumer dropped, abandoning turn");
                            return;
                        }
                    }
                    Err(Error::MalformedSnapshot(reason)) => {
                        tracing::debug!(%reason, "skipping malformed snapshot");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "error during streaming");
                        let _ = tx.send(format!(" [Streaming interrupted: {e}]")).await;
                        return;
                    }
                }
            }

            let answer = tracker.into_text();
            tracing::debug!(answer_len = answer.len(), "remote answer complete");

            let mut conversation = conversation.lock().unwrap_or_else(PoisonError::into_inner);
            conversation.history.push(ConversationTurn::user(user_text));
            conversation.history.push(ConversationTurn::assistant(answer));
        });

        ReceiverStream::new(rx).boxed()
    }

    /// Send a user message and wait for the whole answer
    pub async fn chat(&self, user_text: &str) -> String {
        self.send(user_text).collect::<String>().await
    }

    /// Forget the conversation; the next request carries the system prompt again
    pub fn clear_history(&self) {
        let mut conversation = self.lock();
        conversation.history.clear();
        conversation.system_prompt_sent = false;
    }

    /// Snapshot of the history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.lock().history.clone()
    }

    /// History plus the system prompt (first time only) and the new turn
    fn outgoing_messages(&self, user_text: &str) -> Vec<ConversationTurn> {
        let mut conversation = self.lock();
        let mut messages = Vec::with_capacity(conversation.history.len() + 2);

        if let Some(prompt) = &self.system_prompt
            && !conversation.system_prompt_sent
        {
            messages.push(ConversationTurn::system(prompt.clone()));
            conversation.system_prompt_sent = true;
        }

        messages.extend(conversation.history.iter().cloned());
        messages.push(ConversationTurn::user(user_text));
        messages
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
