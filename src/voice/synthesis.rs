//! Speech synthesis pipeline
//!
//! Text is spoken by two chained child processes: the TTS engine (piper) reads
//! UTF-8 text on stdin and writes raw PCM to stdout, which is connected
//! directly to the audio sink (aplay). The pair is spawned once per utterance
//! and fed incrementally, so speech starts before the full answer is known.
//!
//! Playback failures are logged and reported, never raised: a broken speaker
//! must not stop the assistant loop.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::{Config, Error, Result};

/// Delay after a whole-utterance `speak` so the device is released
const SPEAK_SETTLE: Duration = Duration::from_millis(200);

/// Delay after streamed playback
const STREAM_SETTLE: Duration = Duration::from_millis(300);

/// Delay after the acknowledgement tone
const TONE_SETTLE: Duration = Duration::from_millis(100);

/// Sample rate of the TTS engine's raw output
const TTS_SAMPLE_RATE: u32 = 22050;

/// aplay buffer size in microseconds
const SINK_BUFFER_US: u32 = 500_000;

/// Something that can speak text aloud
#[async_trait]
pub trait Voice: Send + Sync {
    /// Speak a whole utterance, blocking until playback finishes
    async fn speak(&self, text: &str) -> PlaybackReport;

    /// Speak text fragments as they arrive, blocking until playback finishes
    ///
    /// The input is drained even when playback fails part way. A producer that
    /// goes quiet for longer than the playback timeout ends the call.
    async fn speak_stream(&self, chunks: BoxStream<'static, String>) -> PlaybackReport;

    /// Play the acknowledgement tone
    async fn play_tone(&self);
}

/// How a playback attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Both processes exited successfully
    Completed,
    /// A process exited with a non-zero status
    Failed {
        tts: Option<i32>,
        sink: Option<i32>,
    },
    /// Writing to the TTS engine failed; later text was discarded
    Broken,
    /// Playback did not finish in time and the pair was killed
    TimedOut,
    /// The process pair could not be started
    SpawnFailed,
}

/// Summary of one playback attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Chunks consumed from the input
    pub chunks: usize,
    /// Text actually written to the TTS engine
    pub text: String,
    /// How playback ended
    pub outcome: PlaybackOutcome,
}

impl PlaybackReport {
    /// Whether the audio was played without error
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == PlaybackOutcome::Completed
    }
}

/// Program and arguments of an external process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    /// Create a process spec
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

/// TTS engine chained into an audio sink
#[derive(Debug, Clone)]
pub struct SynthesisPipeline {
    tts: ProcessSpec,
    sink: ProcessSpec,
    tone: ProcessSpec,
    playback_timeout: Duration,
    settle: Option<Duration>,
}

impl SynthesisPipeline {
    /// Create a pipeline from explicit process specs
    #[must_use]
    pub fn new(
        tts: ProcessSpec,
        sink: ProcessSpec,
        tone: ProcessSpec,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            tts,
            sink,
            tone,
            playback_timeout,
            settle: None,
        }
    }

    /// Create the piper -> aplay pipeline described by the configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let speech = &config.speech;
        let device = device_args(config.audio_output.as_deref());

        let tts = ProcessSpec::new(
            speech.tts_command.clone(),
            [
                "--model".to_string(),
                speech.tts_model.display().to_string(),
                "--output_file".to_string(),
                "-".to_string(),
            ],
        );

        let mut sink_args: Vec<String> = [
            "-r".to_string(),
            TTS_SAMPLE_RATE.to_string(),
            "-f".to_string(),
            "S16_LE".to_string(),
            "-t".to_string(),
            "raw".to_string(),
        ]
        .into();
        sink_args.extend(device.iter().cloned());
        sink_args.push("-".to_string());
        let sink = ProcessSpec::new(speech.sink_command.clone(), sink_args);

        let mut tone_args = device;
        tone_args.push(speech.beep_path.display().to_string());
        let tone = ProcessSpec::new(speech.sink_command.clone(), tone_args);

        Self::new(tts, sink, tone, speech.playback_timeout)
    }

    /// Override the post-playback settle delay
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }

    async fn run(&self, chunks: BoxStream<'static, String>, settle: Duration) -> PlaybackReport {
        let (mut pair, stdin) = match SpeechProcesses::spawn(&self.tts, &self.sink) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start speech pipeline");
                let fed = feed_chunks(None, chunks, self.playback_timeout).await;
                return PlaybackReport {
                    chunks: fed.chunks,
                    text: String::new(),
                    outcome: PlaybackOutcome::SpawnFailed,
                };
            }
        };

        let mut feeder = tokio::spawn(feed_chunks(Some(stdin), chunks, self.playback_timeout));

        let first = tokio::select! {
            fed = &mut feeder => First::InputDone(fed),
            statuses = pair.wait() => First::ExitedEarly(statuses),
        };

        let (fed, statuses) = match first {
            First::InputDone(fed) => {
                let fed = fed.unwrap_or_else(feeder_panicked);
                if fed.stalled {
                    (fed, None)
                } else {
                    match tokio::time::timeout(self.playback_timeout, pair.wait()).await {
                        Ok(statuses) => (fed, Some(statuses)),
                        Err(_) => (fed, None),
                    }
                }
            }
            First::ExitedEarly(statuses) => {
                tracing::debug!("speech processes exited before input ended");
                let fed = feeder.await.unwrap_or_else(feeder_panicked);
                (fed, Some(statuses))
            }
        };

        pair.terminate().await;

        let outcome = match statuses {
            None => {
                tracing::warn!(timeout = ?self.playback_timeout, "audio process timeout");
                PlaybackOutcome::TimedOut
            }
            Some(_) if fed.stalled => {
                tracing::warn!(timeout = ?self.playback_timeout, "speech input stalled");
                PlaybackOutcome::TimedOut
            }
            Some(_) if fed.broken => PlaybackOutcome::Broken,
            Some((tts, sink)) => exit_outcome(&tts, &sink),
        };

        if !fed.text.is_empty() {
            tracing::info!(text = %fed.text, "assistant");
        }

        tokio::time::sleep(self.settle.unwrap_or(settle)).await;

        PlaybackReport {
            chunks: fed.chunks,
            text: fed.text,
            outcome,
        }
    }
}

#[async_trait]
impl Voice for SynthesisPipeline {
    async fn speak(&self, text: &str) -> PlaybackReport {
        let clean = normalize_utterance(text);
        if clean.trim().is_empty() {
            return PlaybackReport {
                chunks: 0,
                text: String::new(),
                outcome: PlaybackOutcome::Completed,
            };
        }

        self.run(stream::once(async move { clean }).boxed(), SPEAK_SETTLE)
            .await
    }

    async fn speak_stream(&self, chunks: BoxStream<'static, String>) -> PlaybackReport {
        self.run(chunks, STREAM_SETTLE).await
    }

    async fn play_tone(&self) {
        let status = self
            .tone
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(code = ?status.code(), "could not play tone"),
            Err(e) => tracing::warn!(error = %e, "could not play tone"),
        }

        tokio::time::sleep(self.settle.unwrap_or(TONE_SETTLE)).await;
    }
}

enum First {
    InputDone(std::result::Result<FeedResult, tokio::task::JoinError>),
    ExitedEarly((std::io::Result<ExitStatus>, std::io::Result<ExitStatus>)),
}

#[derive(Debug, Default)]
struct FeedResult {
    chunks: usize,
    text: String,
    broken: bool,
    stalled: bool,
}

fn feeder_panicked(e: tokio::task::JoinError) -> FeedResult {
    tracing::error!(error = %e, "speech feeder task failed");
    FeedResult {
        broken: true,
        ..FeedResult::default()
    }
}

/// The running TTS engine and audio sink
struct SpeechProcesses {
    tts: Child,
    sink: Child,
}

impl SpeechProcesses {
    /// Spawn the pair with the engine's stdout wired to the sink's stdin
    fn spawn(tts: &ProcessSpec, sink: &ProcessSpec) -> Result<(Self, ChildStdin)> {
        let mut tts_child = tts
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Synthesis(format!("failed to spawn {}: {e}", tts.program)))?;

        let tts_stdin = tts_child
            .stdin
            .take()
            .ok_or_else(|| Error::Synthesis("TTS stdin not available".to_string()))?;
        let tts_stdout: Stdio = tts_child
            .stdout
            .take()
            .ok_or_else(|| Error::Synthesis("TTS stdout not available".to_string()))?
            .try_into()?;

        // kill_on_drop reaps the engine if the sink fails to start
        let sink_child = sink
            .command()
            .stdin(tts_stdout)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Synthesis(format!("failed to spawn {}: {e}", sink.program)))?;

        tracing::debug!(tts = %tts.program, sink = %sink.program, "speech pipeline started");

        Ok((
            Self {
                tts: tts_child,
                sink: sink_child,
            },
            tts_stdin,
        ))
    }

    async fn wait(&mut self) -> (std::io::Result<ExitStatus>, std::io::Result<ExitStatus>) {
        tokio::join!(self.tts.wait(), self.sink.wait())
    }

    /// Kill whatever is still running and reap both processes
    async fn terminate(&mut self) {
        for child in [&mut self.tts, &mut self.sink] {
            if matches!(child.try_wait(), Ok(None))
                && let Err(e) = child.start_kill()
            {
                tracing::debug!(error = %e, "failed to kill speech process");
            }
            let _ = child.wait().await;
        }
    }
}

/// Write every chunk to the engine in order; drain without writing once broken
///
/// Gives up when no chunk arrives within `idle`, so a stalled producer cannot
/// hold the process pair open.
async fn feed_chunks(
    mut stdin: Option<ChildStdin>,
    mut chunks: BoxStream<'static, String>,
    idle: Duration,
) -> FeedResult {
    let mut result = FeedResult::default();

    loop {
        let chunk = match tokio::time::timeout(idle, chunks.next()).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(timeout = ?idle, "no speech input arrived in time, giving up");
                result.stalled = true;
                break;
            }
        };
        result.chunks += 1;

        let Some(pipe) = stdin.as_mut() else {
            continue;
        };

        let clean = normalize_chunk(&chunk);
        if clean.is_empty() {
            continue;
        }

        match write_chunk(pipe, &clean).await {
            Ok(()) => result.text.push_str(&clean),
            Err(e) => {
                tracing::warn!(error = %e, "TTS input closed, discarding remaining text");
                result.broken = true;
                stdin = None;
            }
        }
    }

    // Dropping stdin signals end of input to the engine
    drop(stdin);
    result
}

async fn write_chunk(pipe: &mut ChildStdin, text: &str) -> std::io::Result<()> {
    pipe.write_all(text.as_bytes()).await?;
    pipe.flush().await
}

fn exit_outcome(
    tts: &std::io::Result<ExitStatus>,
    sink: &std::io::Result<ExitStatus>,
) -> PlaybackOutcome {
    let ok = |s: &std::io::Result<ExitStatus>| s.as_ref().is_ok_and(ExitStatus::success);
    if ok(tts) && ok(sink) {
        return PlaybackOutcome::Completed;
    }

    let code = |s: &std::io::Result<ExitStatus>| s.as_ref().ok().and_then(ExitStatus::code);
    let (tts, sink) = (code(tts), code(sink));
    tracing::warn!(?tts, ?sink, "audio process exited with error");
    PlaybackOutcome::Failed { tts, sink }
}

/// aplay device selection
fn device_args(audio_output: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(card) = audio_output {
        // plughw converts rate and format for cards that lack native support
        args.push("-D".to_string());
        args.push(format!("plughw:{card},0"));
    }
    args.push("-B".to_string());
    args.push(SINK_BUFFER_US.to_string());
    args
}

/// Strip characters that break the engine's tokenizer
#[must_use]
pub fn normalize_chunk(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect()
}

/// [`normalize_chunk`] plus newline folding for whole utterances
#[must_use]
pub fn normalize_utterance(text: &str) -> String {
    normalize_chunk(text).replace(['\r', '\n'], " ")
}
