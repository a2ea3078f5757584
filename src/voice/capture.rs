//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::{AudioFrame, FRAME_SIZE, SAMPLE_RATE};
use crate::{Error, Result};

/// Poll interval while waiting for a full frame
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Blocking source of fixed-size PCM frames
///
/// Not `Send`: cpal streams must stay on the thread that created them.
#[async_trait(?Send)]
pub trait FrameSource {
    /// Wait for the next frame
    async fn read_frame(&mut self) -> Result<AudioFrame>;

    /// Drop everything captured but not yet read
    fn discard_pending(&mut self);
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::DeviceUnavailable("no 16kHz mono input config".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get captured audio buffer without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Take one frame's worth of samples if available
    fn take_frame(&self) -> Option<AudioFrame> {
        let mut buf = self.buffer.lock().ok()?;
        if buf.len() < FRAME_SIZE {
            return None;
        }
        let samples: Vec<f32> = buf.drain(..FRAME_SIZE).collect();
        Some(AudioFrame::from_f32(&samples))
    }
}

#[async_trait(?Send)]
impl FrameSource for AudioCapture {
    async fn read_frame(&mut self) -> Result<AudioFrame> {
        if self.stream.is_none() {
            return Err(Error::DeviceUnavailable("capture not started".to_string()));
        }

        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn discard_pending(&mut self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}
