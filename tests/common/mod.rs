//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use kubic_assistant::remote::{ConversationTurn, InferenceBackend, SnapshotStream};
use kubic_assistant::voice::{
    AudioFrame, PlaybackOutcome, PlaybackReport, Recognition, Transcriber, Voice,
};
use kubic_assistant::{Error, Result};

/// Final transcript
pub fn heard(text: &str) -> Recognition {
    Recognition::Final(text.to_string())
}

/// Partial transcript
pub fn hearing(text: &str) -> Recognition {
    Recognition::Partial(text.to_string())
}

/// Transcriber replaying a fixed script, one result per frame
///
/// Returns `Recognition::Nothing` once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedTranscriber {
    script: Arc<Mutex<VecDeque<Recognition>>>,
    resets: Arc<Mutex<usize>>,
    fed: Arc<Mutex<usize>>,
}

impl ScriptedTranscriber {
    pub fn new(script: impl IntoIterator<Item = Recognition>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn push(&self, recognition: Recognition) {
        self.script.lock().unwrap().push_back(recognition);
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn fed(&self) -> usize {
        *self.fed.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn feed(&mut self, _frame: &AudioFrame) -> Result<Recognition> {
        *self.fed.lock().unwrap() += 1;
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Recognition::Nothing))
    }

    async fn reset(&mut self) -> Result<()> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }
}

/// What a [`RecordingVoice`] was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spoken {
    Utterance(String),
    Stream(Vec<String>),
    Tone,
}

/// Voice that records requests instead of playing audio
#[derive(Clone, Default)]
pub struct RecordingVoice {
    log: Arc<Mutex<Vec<Spoken>>>,
}

impl RecordingVoice {
    pub fn log(&self) -> Vec<Spoken> {
        self.log.lock().unwrap().clone()
    }

    /// Everything except tones
    pub fn speech(&self) -> Vec<Spoken> {
        self.log()
            .into_iter()
            .filter(|s| *s != Spoken::Tone)
            .collect()
    }
}

#[async_trait]
impl Voice for RecordingVoice {
    async fn speak(&self, text: &str) -> PlaybackReport {
        self.log
            .lock()
            .unwrap()
            .push(Spoken::Utterance(text.to_string()));
        PlaybackReport {
            chunks: 1,
            text: text.to_string(),
            outcome: PlaybackOutcome::Completed,
        }
    }

    async fn speak_stream(&self, chunks: BoxStream<'static, String>) -> PlaybackReport {
        let chunks: Vec<String> = chunks.collect().await;
        let text = chunks.concat();
        let count = chunks.len();
        self.log.lock().unwrap().push(Spoken::Stream(chunks));
        PlaybackReport {
            chunks: count,
            text,
            outcome: PlaybackOutcome::Completed,
        }
    }

    async fn play_tone(&self) {
        self.log.lock().unwrap().push(Spoken::Tone);
    }
}

/// Scripted outcome of one remote call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Snapshots then a clean end
    Snapshots(Vec<String>),
    /// Snapshots then a stream failure
    Interrupted(Vec<String>),
    /// Snapshots with malformed updates in between
    WithMalformed(Vec<Option<String>>),
    /// Call cannot be started
    Rejected,
}

impl Reply {
    pub fn snapshots(items: &[&str]) -> Self {
        Self::Snapshots(items.iter().map(ToString::to_string).collect())
    }
}

/// Backend replaying scripted replies and recording submitted messages
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    submitted: Arc<Mutex<Vec<Vec<ConversationTurn>>>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<Vec<ConversationTurn>> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn submit(&self, messages: Vec<ConversationTurn>) -> Result<SnapshotStream> {
        self.submitted.lock().unwrap().push(messages);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Snapshots(Vec::new()));

        let items: Vec<Result<String>> = match reply {
            Reply::Snapshots(snapshots) => snapshots.into_iter().map(Ok).collect(),
            Reply::Interrupted(snapshots) => snapshots
                .into_iter()
                .map(Ok)
                .chain([Err(Error::RemoteStream("connection reset".to_string()))])
                .collect(),
            Reply::WithMalformed(snapshots) => snapshots
                .into_iter()
                .map(|s| s.ok_or_else(|| Error::MalformedSnapshot("no content".to_string())))
                .collect(),
            Reply::Rejected => {
                return Err(Error::RemoteSubmission("connection refused".to_string()));
            }
        };

        Ok(stream::iter(items).boxed())
    }
}
