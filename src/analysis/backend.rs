/// Inference backend port
///
/// Implementations: `SimulatedBackend`. A real image classifier or speech
/// service plugs in here.
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::records::Urgency;

/// Raw backend output before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    /// Percentage, expected in [0, 100] with one decimal
    pub confidence: f64,
    pub diagnosis: String,
    #[serde(default)]
    pub details: String,
    /// Highest priority first
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    /// Only meaningful for interpreted transcripts
    #[serde(default)]
    pub symptoms: Vec<String>,
}

/// Image bytes handed to the backend
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

/// WAV bytes handed to the backend
#[derive(Debug, Clone, Copy)]
pub struct AudioPayload<'a> {
    pub wav: &'a [u8],
    pub duration_seconds: f64,
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn classify_image(&self, image: ImagePayload<'_>) -> Result<Finding>;

    /// Speech to text; may legitimately return an empty string
    async fn transcribe(&self, audio: AudioPayload<'_>) -> Result<String>;

    /// Symptom description to finding
    async fn interpret(&self, transcript: &str) -> Result<Finding>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
