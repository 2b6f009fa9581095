use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Largest accepted image upload
    pub max_image_bytes: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
}

impl CaptureConfig {
    /// Reject audio settings the recorder cannot produce frames for
    pub fn validate(&self) -> Result<()> {
        let invalid = if self.sample_rate == 0 {
            Some("capture.sample_rate")
        } else if self.channels == 0 {
            Some("capture.channels")
        } else if self.buffer_duration_ms == 0 {
            Some("capture.buffer_duration_ms")
        } else {
            None
        };
        match invalid {
            Some(key) => Err(PipelineError::Config(config::ConfigError::Message(format!(
                "{} must be greater than zero",
                key
            )))),
            None => Ok(()),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

/// Latencies of the simulated backend, plus the per-call timeout applied to any backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub image_latency_ms: u64,
    pub transcribe_latency_ms: u64,
    pub interpret_latency_ms: u64,
    pub timeout_secs: u64,
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            image_latency_ms: 3000,
            transcribe_latency_ms: 2000,
            interpret_latency_ms: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

impl StorageConfig {
    /// Database path with `~` expanded
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "~/.health-analysis/records.db".to_string(),
        }
    }
}

impl Config {
    /// Load from `path` (any format the `config` crate understands, extension optional)
    /// with `HEALTH_ANALYSIS__SECTION__KEY` environment overrides. A missing file
    /// leaves the defaults in place.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("HEALTH_ANALYSIS").separator("__"))
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.capture.validate()?;
        Ok(loaded)
    }
}
