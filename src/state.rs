//! Dialogue state machine
//!
//! Pure transition logic for the wake word / command cycle. Time is passed in
//! by the caller so the cooldown and timeout policy can be driven
//! deterministically.

use std::time::{Duration, Instant};

use crate::Config;
use crate::voice::{Recognition, WakeWordMatcher};

/// Phase of the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the wake phrase
    Idle,
    /// Wake phrase accepted, capturing a command
    ListeningCommand,
    /// Answering a command; no audio is evaluated
    Processing,
}

/// What a recognizer result did to the dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed
    None,
    /// Wake phrase accepted; start listening for a command
    WakeAccepted,
    /// Wake phrase heard inside the cooldown window
    WakeIgnored,
    /// Speech in progress pushed the command deadline back
    CommandExtended,
    /// No command arrived in time
    CommandTimedOut,
    /// Command transcript ready to answer
    CommandReady(String),
    /// Recognizer finished with an empty command
    CommandEmpty,
}

/// Wake and timeout policy
#[derive(Debug, Clone)]
pub struct DialoguePolicy {
    pub matcher: WakeWordMatcher,
    pub wake_cooldown: Duration,
    pub command_timeout: Duration,
}

impl DialoguePolicy {
    /// Policy described by the configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            matcher: WakeWordMatcher::new(&config.wake_word, config.strict_wake_word),
            wake_cooldown: config.wake_cooldown,
            command_timeout: config.command_timeout,
        }
    }
}

/// The single dialogue state owned by the assistant loop
#[derive(Debug, Clone)]
pub struct DialogueState {
    policy: DialoguePolicy,
    phase: Phase,
    last_wake: Option<Instant>,
    command_start: Option<Instant>,
}

impl DialogueState {
    /// Start idle with no wake history
    #[must_use]
    pub const fn new(policy: DialoguePolicy) -> Self {
        Self {
            policy,
            phase: Phase::Idle,
            last_wake: None,
            command_start: None,
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// When the last accepted wake phrase was heard
    #[must_use]
    pub const fn last_wake(&self) -> Option<Instant> {
        self.last_wake
    }

    /// Handle a wake recognizer result while idle
    ///
    /// Only final transcripts count. The cooldown runs from the last accepted
    /// wake phrase, not from every occurrence.
    pub fn on_wake(&mut self, recognition: &Recognition, now: Instant) -> Transition {
        if self.phase != Phase::Idle {
            return Transition::None;
        }

        let Recognition::Final(text) = recognition else {
            return Transition::None;
        };

        if !self.policy.matcher.matches(text) {
            return Transition::None;
        }

        let cooled_down = self
            .last_wake
            .is_none_or(|last| now.saturating_duration_since(last) >= self.policy.wake_cooldown);

        if !cooled_down {
            tracing::debug!(transcript = %text, "wake word inside cooldown, ignored");
            return Transition::WakeIgnored;
        }

        tracing::info!(wake_word = self.policy.matcher.wake_word(), "wake word detected");
        self.last_wake = Some(now);
        self.command_start = Some(now);
        self.phase = Phase::ListeningCommand;
        Transition::WakeAccepted
    }

    /// Abandon the command if the deadline passed
    ///
    /// Returns true if the dialogue went back to idle.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.phase != Phase::ListeningCommand {
            return false;
        }

        let elapsed = self
            .command_start
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start));

        if elapsed > self.policy.command_timeout {
            tracing::info!(?elapsed, "command timeout, returning to wake word detection");
            self.phase = Phase::Idle;
            self.command_start = None;
            return true;
        }

        false
    }

    /// Handle a command recognizer result while listening
    pub fn on_command(&mut self, recognition: &Recognition, now: Instant) -> Transition {
        if self.phase != Phase::ListeningCommand {
            return Transition::None;
        }

        match recognition {
            Recognition::Nothing => Transition::None,
            Recognition::Partial(text) if text.trim().is_empty() => Transition::None,
            Recognition::Partial(_) => {
                self.command_start = Some(now);
                Transition::CommandExtended
            }
            Recognition::Final(text) if text.trim().is_empty() => {
                tracing::debug!("empty command, returning to idle");
                self.phase = Phase::Idle;
                self.command_start = None;
                Transition::CommandEmpty
            }
            Recognition::Final(text) => {
                tracing::info!(command = %text, "command received");
                self.phase = Phase::Processing;
                self.command_start = None;
                Transition::CommandReady(text.trim().to_string())
            }
        }
    }

    /// The answer has been spoken; go back to idle
    pub fn finish_processing(&mut self) {
        if self.phase == Phase::Processing {
            self.phase = Phase::Idle;
        }
    }
}
