use anyhow::{bail, Result};
use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::clip::AudioClip;
use crate::config::CaptureConfig;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since recording started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate of produced frames
    pub target_sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

impl From<&CaptureConfig> for AudioBackendConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            target_sample_rate: config.sample_rate,
            target_channels: config.channels,
            buffer_duration_ms: config.buffer_duration_ms,
        }
    }
}

impl AudioBackendConfig {
    fn samples_per_frame(&self) -> usize {
        (self.target_sample_rate as u64 * self.buffer_duration_ms / 1000) as usize
            * self.target_channels as usize
    }
}

/// Outcome of a microphone permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Microphone capture backend
///
/// The session asks for permission first, then starts the frame stream.
/// Dropping the receiver side does not stop the device; `stop` must be called.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Prompt for microphone access (may suspend until the user answers)
    async fn request_access(&mut self) -> Permission;

    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and close the frame channel
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Generated sine tone (no device required)
    Synthetic,
    /// Replay a WAV file at real-time pace
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Synthetic => Ok(Box::new(SyntheticMicrophone::new(config))),
            AudioSource::File(path) => Ok(Box::new(WavFileBackend::open(path, config)?)),
        }
    }
}

/// Produces a 440Hz tone in real time, one frame per buffer interval
pub struct SyntheticMicrophone {
    config: AudioBackendConfig,
    permission: Permission,
    producer: Option<JoinHandle<()>>,
}

impl SyntheticMicrophone {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            permission: Permission::Granted,
            producer: None,
        }
    }

    /// A microphone whose permission prompt is always declined
    pub fn denied(config: AudioBackendConfig) -> Self {
        Self {
            permission: Permission::Denied,
            ..Self::new(config)
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for SyntheticMicrophone {
    async fn request_access(&mut self) -> Permission {
        self.permission
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.permission == Permission::Denied {
            bail!("Microphone access was not granted");
        }
        if self.producer.is_some() {
            bail!("Already capturing");
        }
        if self.config.target_channels == 0 || self.config.target_sample_rate == 0 {
            bail!(
                "Unsupported audio format: {} Hz, {} channels",
                self.config.target_sample_rate,
                self.config.target_channels
            );
        }

        let (tx, rx) = mpsc::channel(64);
        let config = self.config.clone();
        let frame_len = config.samples_per_frame();

        self.producer = Some(tokio::spawn(async move {
            let period = Duration::from_millis(config.buffer_duration_ms.max(1));
            let mut ticker = tokio::time::interval(period);
            let mut sample_index: u64 = 0;
            let mut timestamp_ms = 0;

            loop {
                ticker.tick().await;
                let samples = (0..frame_len)
                    .map(|i| {
                        let n = sample_index + (i / config.target_channels as usize) as u64;
                        let t = n as f32 / config.target_sample_rate as f32;
                        ((2.0 * PI * 440.0 * t).sin() * 8000.0) as i16
                    })
                    .collect();
                sample_index += (frame_len / config.target_channels as usize) as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate: config.target_sample_rate,
                    channels: config.target_channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += config.buffer_duration_ms;
            }
        }));

        info!(
            "Synthetic microphone started ({}Hz, {} channels)",
            self.config.target_sample_rate, self.config.target_channels
        );
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(producer) = self.producer.take() {
            producer.abort();
            info!("Synthetic microphone stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.producer.is_some()
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Replays a WAV file as if it were being spoken into the microphone
pub struct WavFileBackend {
    clip: AudioClip,
    config: AudioBackendConfig,
    producer: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn open(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Result<Self> {
        let clip = AudioClip::open(path.into())?;
        Ok(Self {
            clip,
            config,
            producer: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn request_access(&mut self) -> Permission {
        Permission::Granted
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.producer.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(64);
        let clip = self.clip.clone();
        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let frame_len =
            (clip.sample_rate as u64 * buffer_ms / 1000) as usize * clip.channels as usize;

        self.producer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(buffer_ms));
            for (index, chunk) in clip.samples.chunks(frame_len.max(1)).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: clip.sample_rate,
                    channels: clip.channels,
                    timestamp_ms: index as u64 * buffer_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));

        info!("Replaying {} ({:.1}s)", self.clip.source, self.clip.duration_seconds);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.producer.is_some()
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
