//! Assistant loop
//!
//! Owns the dialogue state and every component, feeds each captured frame to
//! the recognizer of the current phase and answers finished commands.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::intents::{self, IntentRouter, Route};
use crate::remote::DialogueClient;
use crate::state::{DialoguePolicy, DialogueState, Phase, Transition};
use crate::voice::{
    AudioFrame, FrameSource, SidecarTranscriber, SynthesisPipeline, Transcriber, Voice,
};
use crate::{Config, Error, Result};

/// Consecutive recognizer failures tolerated before the loop gives up
const MAX_RECOGNITION_FAILURES: u32 = 10;

/// Consecutive capture failures tolerated before the loop gives up
const MAX_CAPTURE_FAILURES: u32 = 10;

/// Pause before reading again after a capture failure
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// The voice assistant
pub struct Assistant {
    config: Config,
    state: DialogueState,
    wake: Box<dyn Transcriber>,
    command: Box<dyn Transcriber>,
    voice: Arc<dyn Voice>,
    intents: IntentRouter,
    client: DialogueClient,
}

impl Assistant {
    /// Assemble an assistant from its components
    ///
    /// # Errors
    ///
    /// Returns error if the weather HTTP client cannot be built
    pub fn new(
        config: Config,
        wake: Box<dyn Transcriber>,
        command: Box<dyn Transcriber>,
        voice: Arc<dyn Voice>,
        client: DialogueClient,
    ) -> Result<Self> {
        Ok(Self {
            state: DialogueState::new(DialoguePolicy::from_config(&config)),
            intents: IntentRouter::new(&config)?,
            config,
            wake,
            command,
            voice,
            client,
        })
    }

    /// Build the production assistant: two recognizer sidecars, the
    /// piper/aplay pipeline and the Gradio client
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer model is missing, a sidecar cannot be
    /// started or the remote URL is invalid
    pub fn from_config(config: Config) -> Result<Self> {
        let wake = SidecarTranscriber::spawn(&config.recognizer, "wake")?;
        let command = SidecarTranscriber::spawn(&config.recognizer, "command")?;
        let voice = SynthesisPipeline::from_config(&config);
        let client = DialogueClient::from_config(&config)?;

        Self::new(
            config,
            Box::new(wake),
            Box::new(command),
            Arc::new(voice),
            client,
        )
    }

    /// Current dialogue phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// The remote dialogue client
    #[must_use]
    pub const fn client(&self) -> &DialogueClient {
        &self.client
    }

    /// Process one captured frame observed at `now`
    ///
    /// A finished command is answered before this returns.
    ///
    /// # Errors
    ///
    /// Returns error if a recognizer fails
    pub async fn step(&mut self, frame: &AudioFrame, now: Instant) -> Result<Transition> {
        match self.state.phase() {
            Phase::Idle => {
                let recognition = self.wake.feed(frame).await?;
                let transition = self.state.on_wake(&recognition, now);

                if transition == Transition::WakeAccepted {
                    self.wake.reset().await?;
                    self.command.reset().await?;
                    self.voice.play_tone().await;
                }
                Ok(transition)
            }
            Phase::ListeningCommand => {
                if self.state.check_timeout(now) {
                    self.wake.reset().await?;
                    return Ok(Transition::CommandTimedOut);
                }

                let recognition = self.command.feed(frame).await?;
                let transition = self.state.on_command(&recognition, now);

                match &transition {
                    Transition::CommandReady(command) => {
                        self.respond(command).await;
                        self.state.finish_processing();
                        self.wake.reset().await?;
                    }
                    Transition::CommandEmpty => self.wake.reset().await?,
                    _ => {}
                }
                Ok(transition)
            }
            Phase::Processing => Ok(Transition::None),
        }
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns the last error once capture or recognition keeps failing
    pub async fn run<S: FrameSource>(&mut self, source: &mut S) -> Result<()> {
        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let result = self.run_until(source, shutdown_rx).await;
        ctrl_c.abort();
        result
    }

    /// Run until `shutdown` fires or all of its senders are dropped
    ///
    /// Capture and recognizer failures skip the frame; the loop gives up
    /// once either fails too many times in a row. Shutdown also cuts short
    /// an answer that is being spoken.
    ///
    /// # Errors
    ///
    /// Returns the last error once capture or recognition keeps failing
    pub async fn run_until<S: FrameSource>(
        &mut self,
        source: &mut S,
        mut shutdown: mpsc::Receiver<()>,
    ) -> Result<()> {
        tracing::info!(
            wake_word = %self.config.wake_word,
            language = self.config.language.code(),
            "listening for wake word"
        );

        let mut capture_failures = 0;
        let mut recognition_failures = 0;

        loop {
            let read = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("interrupted, shutting down");
                    return Ok(());
                }
                read = source.read_frame() => read,
            };

            let frame = match read {
                Ok(frame) => {
                    capture_failures = 0;
                    frame
                }
                Err(e) if capture_failures + 1 < MAX_CAPTURE_FAILURES => {
                    capture_failures += 1;
                    tracing::warn!(
                        error = %e,
                        failures = capture_failures,
                        "capture failed, retrying"
                    );
                    tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let stepped = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("interrupted, shutting down");
                    return Ok(());
                }
                stepped = self.step(&frame, Instant::now()) => stepped,
            };

            match stepped {
                // Tone and answer playback were picked up by the microphone
                Ok(Transition::WakeAccepted | Transition::CommandReady(_)) => {
                    recognition_failures = 0;
                    source.discard_pending();
                }
                Ok(_) => recognition_failures = 0,
                Err(e @ Error::Recognition(_))
                    if recognition_failures + 1 < MAX_RECOGNITION_FAILURES =>
                {
                    recognition_failures += 1;
                    tracing::warn!(
                        error = %e,
                        failures = recognition_failures,
                        "recognizer failed, skipping frame"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Answer a command, locally or through the remote model
    async fn respond(&self, command: &str) {
        if self.config.think_aloud {
            self.voice.speak(self.config.language.thinking()).await;
        }

        let report = match intents::route(command, &self.config) {
            Route::Local(intent) => {
                let answer = self
                    .intents
                    .answer(intent, &self.config, &chrono::Local::now())
                    .await;
                tracing::info!(?intent, %answer, "answering locally");
                self.voice.speak(&answer).await
            }
            Route::Delegate => {
                tracing::debug!(%command, "delegating to remote model");
                let report = self.voice.speak_stream(self.client.send(command)).await;
                tracing::info!(
                    answer = %report.text,
                    chunks = report.chunks,
                    "remote answer spoken"
                );
                report
            }
        };

        if !report.is_success() {
            tracing::warn!(outcome = ?report.outcome, "answer playback did not complete");
        }
    }
}
