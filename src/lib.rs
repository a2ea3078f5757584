//! Kubic - wake-word voice assistant
//!
//! This library provides the core functionality for the Kubic assistant:
//! - Wake word and command state machine
//! - Local intents (time, weather)
//! - Remote dialogue client with streamed answers
//! - Streaming speech synthesis through a TTS engine piped into an audio sink
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Microphone (cpal)                  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ 16 kHz frames
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Assistant                        │
//! │   Wake recognizer  │  State machine  │  Command rec. │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │ local intent                │ delegate
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │   Time  │  Weather  │       │  Remote dialogue       │
//! └──────────┬──────────┘       └──────────┬────────────┘
//!            │ text                        │ deltas
//! ┌──────────▼─────────────────────────────▼────────────┐
//! │          Synthesis pipeline: piper | aplay           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod intents;
pub mod remote;
pub mod state;
pub mod voice;

pub use assistant::Assistant;
pub use config::Config;
pub use error::{Error, Result};
pub use remote::DialogueClient;
