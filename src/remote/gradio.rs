//! Gradio call protocol for the RKLLM chat server
//!
//! A call is two requests: a POST to `gradio_api/call/{api}` carrying the
//! message list returns an event id, then a GET on
//! `gradio_api/call/{api}/{event_id}` streams server-sent events. Each
//! `generating` event carries the whole chat history so far; `complete` ends
//! the call.
//!
//! The server's `/get_user_input` endpoint is a UI helper and is not called;
//! the full history goes straight to the generation endpoint.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{ConversationTurn, InferenceBackend, SnapshotStream};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between reads of a response body
const READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct CallStarted {
    event_id: String,
}

/// Entry of the history list returned by the server
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEntry {
    Message { role: String, content: WireContent },
    Pair(Vec<Option<Value>>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: String,
}

/// Extract the answer-so-far from one event payload
///
/// The payload is the list of endpoint outputs; the first output is the
/// chat history, whose last entry holds the assistant text.
pub(crate) fn snapshot_text(payload: &Value) -> Result<String> {
    let malformed = |reason: &str| Error::MalformedSnapshot(reason.to_string());

    let history = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("payload carries no history"))?;
    let last = history
        .last()
        .ok_or_else(|| malformed("history is empty"))?;

    let entry: WireEntry = serde_json::from_value(last.clone())
        .map_err(|e| Error::MalformedSnapshot(format!("unrecognized history entry: {e}")))?;

    match entry {
        WireEntry::Message { role, content } => {
            if role != "assistant" {
                return Err(malformed("last message is not from the assistant"));
            }
            match content {
                WireContent::Text(text) => Ok(text),
                WireContent::Parts(parts) if parts.is_empty() => {
                    Err(malformed("message has no text parts"))
                }
                WireContent::Parts(parts) => Ok(parts.into_iter().map(|p| p.text).collect()),
            }
        }
        WireEntry::Pair(pair) => match pair.get(1) {
            Some(Some(Value::String(text))) => Ok(text.clone()),
            _ => Err(malformed("pair entry has no answer text")),
        },
    }
}

/// Server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental server-sent events decoder
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw body bytes; returns events completed by this chunk
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event not terminated by a blank line
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            self.line(rest.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// What one event means for the answer
#[derive(Debug)]
enum Step {
    Snapshot(Result<String>),
    Done(Result<String>),
    Failed(Error),
    Skip,
}

fn interpret(event: &SseEvent) -> Step {
    match event.event.as_str() {
        "generating" | "complete" => {
            let snapshot = serde_json::from_str::<Value>(&event.data)
                .map_err(|e| Error::MalformedSnapshot(format!("invalid event data: {e}")))
                .and_then(|payload| snapshot_text(&payload));
            if event.event == "complete" {
                Step::Done(snapshot)
            } else {
                Step::Snapshot(snapshot)
            }
        }
        "error" => {
            let detail = match event.data.trim() {
                "" | "null" => "server reported an error".to_string(),
                other => other.to_string(),
            };
            Step::Failed(Error::RemoteStream(detail))
        }
        _ => Step::Skip,
    }
}

struct EventStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    queued: VecDeque<Result<String>>,
    done: bool,
}

impl EventStream {
    /// Apply events; returns false once the call is over
    fn absorb(&mut self, events: Vec<SseEvent>) -> bool {
        for event in events {
            match interpret(&event) {
                Step::Snapshot(snapshot) => self.queued.push_back(snapshot),
                Step::Done(snapshot) => {
                    self.queued.push_back(snapshot);
                    return false;
                }
                Step::Failed(e) => {
                    self.queued.push_back(Err(e));
                    return false;
                }
                Step::Skip => {}
            }
        }
        true
    }
}

/// Turn a server-sent events body into a snapshot stream
pub(crate) fn snapshots(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> SnapshotStream {
    let state = EventStream {
        body,
        decoder: SseDecoder::default(),
        queued: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(&bytes);
                    state.done = !state.absorb(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.queued.push_back(Err(Error::RemoteStream(e.to_string())));
                }
                None => {
                    state.done = true;
                    let tail: Vec<SseEvent> = state.decoder.finish().into_iter().collect();
                    if state.absorb(tail) {
                        state.queued.push_back(Err(Error::RemoteStream(
                            "stream closed before completion".to_string(),
                        )));
                    }
                }
            }
        }
    })
    .boxed()
}

/// Gradio backend for the RKLLM server
#[derive(Debug, Clone)]
pub struct GradioBackend {
    client: reqwest::Client,
    call_url: Url,
}

impl GradioBackend {
    /// Create a backend for `endpoint` calling `api_name`
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built
    pub fn new(endpoint: &str, api_name: &str) -> Result<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let api = api_name.trim_start_matches('/');
        let call_url = base.join(&format!("gradio_api/call/{api}"))?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;

        Ok(Self { client, call_url })
    }

    /// URL of the generation endpoint
    #[must_use]
    pub const fn call_url(&self) -> &Url {
        &self.call_url
    }

    fn event_url(&self, event_id: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{event_id}", self.call_url))?)
    }
}

#[async_trait]
impl InferenceBackend for GradioBackend {
    async fn submit(&self, messages: Vec<ConversationTurn>) -> Result<SnapshotStream> {
        tracing::debug!(url = %self.call_url, messages = messages.len(), "submitting chat history");

        let response = self
            .client
            .post(self.call_url.clone())
            .json(&json!({ "data": [messages] }))
            .send()
            .await
            .map_err(|e| Error::RemoteSubmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteSubmission(format!("{status}: {body}")));
        }

        let CallStarted { event_id } = response
            .json()
            .await
            .map_err(|e| Error::RemoteSubmission(format!("invalid call response: {e}")))?;

        let response = self
            .client
            .get(self.event_url(&event_id)?)
            .send()
            .await
            .map_err(|e| Error::RemoteSubmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteSubmission(format!(
                "event stream returned {status}"
            )));
        }

        tracing::debug!(%event_id, "streaming answer");
        let body = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Ok(snapshots(body.boxed()))
    }
}
