use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::backend::{AnalysisBackend, AudioPayload, Finding, ImagePayload};
use crate::config::AnalysisConfig;
use crate::records::Urgency;

const SAMPLE_TRANSCRIPT: &str = "I've been experiencing persistent headaches for the past \
three days, particularly in the morning. The pain is located on the right side of my head \
and feels like a throbbing sensation. I've also noticed some sensitivity to light and \
occasional nausea. The headaches seem to worsen when I'm stressed or haven't had enough sleep.";

/// Canned backend with fixed latencies
///
/// Stands in for real inference services in demos and tests. Every image gets the
/// same skin-lesion finding and every recording transcribes to the same headache
/// description.
pub struct SimulatedBackend {
    image_latency: Duration,
    transcribe_latency: Duration,
    interpret_latency: Duration,
}

impl SimulatedBackend {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            image_latency: Duration::from_millis(config.image_latency_ms),
            transcribe_latency: Duration::from_millis(config.transcribe_latency_ms),
            interpret_latency: Duration::from_millis(config.interpret_latency_ms),
        }
    }

    /// Zero latency everywhere
    pub fn instant() -> Self {
        Self {
            image_latency: Duration::ZERO,
            transcribe_latency: Duration::ZERO,
            interpret_latency: Duration::ZERO,
        }
    }
}

#[async_trait]
impl AnalysisBackend for SimulatedBackend {
    async fn classify_image(&self, image: ImagePayload<'_>) -> Result<Finding> {
        debug!("Simulating classification of {} bytes of {}", image.bytes.len(), image.mime_type);
        tokio::time::sleep(self.image_latency).await;

        Ok(Finding {
            confidence: 94.2,
            diagnosis: "Possible skin lesion detected".to_string(),
            details: "AI analysis indicates irregularities in pigmentation and border \
                      characteristics that warrant professional evaluation."
                .to_string(),
            recommendations: vec![
                "Consult with a dermatologist within 2 weeks".to_string(),
                "Monitor for any changes in size or color".to_string(),
                "Avoid direct sun exposure on the area".to_string(),
            ],
            urgency: Some(Urgency::Medium),
            symptoms: Vec::new(),
        })
    }

    async fn transcribe(&self, audio: AudioPayload<'_>) -> Result<String> {
        debug!("Simulating transcription of {:.1}s of audio", audio.duration_seconds);
        tokio::time::sleep(self.transcribe_latency).await;
        Ok(SAMPLE_TRANSCRIPT.to_string())
    }

    async fn interpret(&self, transcript: &str) -> Result<Finding> {
        debug!("Simulating interpretation of {} chars", transcript.len());
        tokio::time::sleep(self.interpret_latency).await;

        Ok(Finding {
            confidence: 87.5,
            diagnosis: "Tension headache with possible migraine features".to_string(),
            details: "Based on the described symptoms, this appears to be a tension-type headache \
                      with some migraine characteristics. The pattern of morning headaches and \
                      stress correlation suggests lifestyle factors may be contributing."
                .to_string(),
            recommendations: vec![
                "Consider stress management techniques".to_string(),
                "Maintain regular sleep schedule".to_string(),
                "Stay hydrated and avoid trigger foods".to_string(),
                "Consult with primary care physician if symptoms persist".to_string(),
            ],
            urgency: Some(Urgency::Low),
            symptoms: vec![
                "Persistent headaches".to_string(),
                "Photophobia".to_string(),
                "Nausea".to_string(),
                "Right-sided pain".to_string(),
            ],
        })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
