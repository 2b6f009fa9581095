use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

use super::backend::AudioFrame;

/// Buffered 16-bit PCM audio
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Where the samples came from (file path or "recording")
    pub source: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioClip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;
        Self::from_reader(reader, path.display().to_string())
    }

    /// Decode a WAV container held in memory
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV data")?;
        Self::from_reader(reader, "memory".to_string())
    }

    fn from_reader<R: std::io::Read>(reader: WavReader<R>, source: String) -> Result<Self> {
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "Unsupported WAV encoding: {} bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        Ok(Self::new(source, samples, spec.sample_rate, spec.channels))
    }

    /// Concatenate captured frames. Frames are expected to share one format;
    /// the first frame decides it.
    pub fn from_frames(frames: &[AudioFrame]) -> Option<Self> {
        let first = frames.first()?;
        let samples = frames.iter().flat_map(|f| f.samples.iter().copied()).collect();
        Some(Self::new(
            "recording".to_string(),
            samples,
            first.sample_rate,
            first.channels,
        ))
    }

    fn new(source: String, samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        let duration_seconds = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (sample_rate as f64 * channels as f64)
        };

        Self {
            source,
            duration_seconds,
            sample_rate,
            channels,
            samples,
        }
    }

    /// Encode as a 16-bit PCM WAV container
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }

        Ok(cursor.into_inner())
    }
}
