use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{AnalysisBackend, AudioPayload, Finding, ImagePayload};
use crate::capture::CaptureInput;
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result};
use crate::records::{Assessment, Confidence, DiagnosticResult, Findings, UserId};

/// Turns validated capture input into a `DiagnosticResult`
///
/// Stateless apart from the backend handle; single-flight is enforced by the
/// capture session, so one engine can serve many sessions. Never touches storage.
#[derive(Clone)]
pub struct AnalysisEngine {
    backend: Arc<dyn AnalysisBackend>,
    timeout: Duration,
}

impl AnalysisEngine {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: &AnalysisConfig) -> Self {
        Self {
            backend,
            timeout: config.timeout(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Validate the input, then run the backend for its modality
    pub async fn analyze(&self, owner: &UserId, input: &CaptureInput) -> Result<DiagnosticResult> {
        input.validate()?;

        match input {
            CaptureInput::Image { bytes, mime_type } => {
                let payload = ImagePayload { bytes, mime_type };
                let finding = self
                    .call("image classification", self.backend.classify_image(payload))
                    .await?;
                let assessment = normalize(finding)?;
                Ok(DiagnosticResult::create(
                    owner.clone(),
                    assessment,
                    Findings::Image,
                    Utc::now(),
                ))
            }
            CaptureInput::Audio { .. } => {
                let transcript = self.transcribe(input).await?;
                self.interpret(owner, &transcript).await
            }
        }
    }

    /// First voice phase; retryable on its own
    pub async fn transcribe(&self, input: &CaptureInput) -> Result<String> {
        input.validate()?;
        let CaptureInput::Audio {
            bytes,
            duration_seconds,
        } = input
        else {
            return Err(PipelineError::InvalidInputKind(format!(
                "cannot transcribe {} input",
                input.kind()
            )));
        };

        let payload = AudioPayload {
            wav: bytes,
            duration_seconds: *duration_seconds,
        };
        let transcript = self
            .call("transcription", self.backend.transcribe(payload))
            .await?;
        debug!("Transcribed {:.1}s of audio into {} chars", duration_seconds, transcript.len());
        Ok(transcript)
    }

    /// Second voice phase; refuses blank transcripts
    pub async fn interpret(&self, owner: &UserId, transcript: &str) -> Result<DiagnosticResult> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            warn!("Refusing to interpret an empty transcription");
            return Err(PipelineError::EmptyTranscription);
        }

        let finding = self
            .call("symptom interpretation", self.backend.interpret(transcript))
            .await?;
        let symptoms = finding
            .symptoms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let assessment = normalize(finding)?;

        Ok(DiagnosticResult::create(
            owner.clone(),
            assessment,
            Findings::Voice {
                transcription: transcript.to_string(),
                symptoms,
            },
            Utc::now(),
        ))
    }

    /// Await one backend call under the timeout, mapping every failure to `AnalysisFailed`
    async fn call<T>(
        &self,
        step: &str,
        request: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        info!("Running {} on {} backend", step, self.backend.name());

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed: {:#}", step, e);
                Err(PipelineError::analysis_failed(format!("{}: {:#}", step, e)))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", step, self.timeout);
                Err(PipelineError::analysis_failed(format!(
                    "{} timed out after {}s",
                    step,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

/// Range-check and tidy backend output
fn normalize(finding: Finding) -> Result<Assessment> {
    let confidence = Confidence::clamped(finding.confidence).ok_or_else(|| {
        PipelineError::analysis_failed(format!(
            "backend returned confidence {}",
            finding.confidence
        ))
    })?;
    if confidence.value() != finding.confidence {
        debug!("Confidence {} normalized to {}", finding.confidence, confidence.value());
    }

    let diagnosis = finding.diagnosis.trim().to_string();
    if diagnosis.is_empty() {
        return Err(PipelineError::analysis_failed("backend returned an empty diagnosis"));
    }

    let recommendations = finding
        .recommendations
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    Ok(Assessment {
        confidence,
        diagnosis,
        details: finding.details.trim().to_string(),
        recommendations,
        urgency: finding.urgency.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Modality, Urgency};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FixedBackend {
        finding: Finding,
        transcript: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisBackend for FixedBackend {
        async fn classify_image(&self, _image: ImagePayload<'_>) -> anyhow::Result<Finding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.finding.clone())
        }

        async fn transcribe(&self, _audio: AudioPayload<'_>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.transcript.clone())
        }

        async fn interpret(&self, _transcript: &str) -> anyhow::Result<Finding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.finding.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn engine(backend: FixedBackend) -> (AnalysisEngine, Arc<FixedBackend>) {
        let backend = Arc::new(backend);
        (
            AnalysisEngine::new(backend.clone(), &AnalysisConfig::default()),
            backend,
        )
    }

    fn finding(confidence: f64) -> Finding {
        Finding {
            confidence,
            diagnosis: "  Possible skin lesion ".to_string(),
            details: "Irregular border".to_string(),
            recommendations: vec!["See a dermatologist".into(), " ".into(), "Avoid sun".into()],
            urgency: Some(Urgency::Medium),
            symptoms: vec!["Itching".into()],
        }
    }

    #[tokio::test]
    async fn test_image_result_has_no_voice_fields() -> Result<()> {
        let (engine, _) = engine(FixedBackend {
            finding: finding(94.2),
            ..Default::default()
        });
        let input = CaptureInput::image(vec![7; 512], "image/png")?;

        let result = engine.analyze(&UserId::new("u1"), &input).await?;

        assert_eq!(result.modality(), Modality::Image);
        assert!(result.transcription().is_none());
        assert!(result.symptoms().is_none());
        assert_eq!(result.diagnosis(), "Possible skin lesion");
        assert_eq!(result.recommendations(), ["See a dermatologist", "Avoid sun"]);
        assert_eq!(result.urgency(), Urgency::Medium);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() -> Result<()> {
        let (engine, _) = engine(FixedBackend {
            finding: finding(123.45),
            ..Default::default()
        });
        let input = CaptureInput::image(vec![7; 16], "image/jpeg")?;

        let result = engine.analyze(&UserId::new("u1"), &input).await?;
        assert_eq!(result.confidence().value(), 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_nan_confidence_fails() {
        let (engine, _) = engine(FixedBackend {
            finding: finding(f64::NAN),
            ..Default::default()
        });
        let input = CaptureInput::image(vec![7; 16], "image/jpeg").unwrap();

        let err = engine.analyze(&UserId::new("u1"), &input).await.unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisFailed { .. }));
    }

    #[tokio::test]
    async fn test_empty_bytes_never_reach_backend() {
        let (engine, backend) = engine(FixedBackend::default());
        let input = CaptureInput::Image {
            bytes: Vec::new(),
            mime_type: "image/png".to_string(),
        };

        let err = engine.analyze(&UserId::new("u1"), &input).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInputKind(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_transcription_is_refused() {
        let (engine, backend) = engine(FixedBackend {
            finding: finding(80.0),
            transcript: " \n\t ".to_string(),
            ..Default::default()
        });
        let input = CaptureInput::audio(vec![1; 64], 2.0).unwrap();

        let err = engine.analyze(&UserId::new("u1"), &input).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTranscription));
        // transcribe ran, interpret did not
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_voice_phases_run_independently() -> Result<()> {
        let (engine, _) = engine(FixedBackend {
            finding: finding(87.5),
            transcript: "My head hurts".to_string(),
            ..Default::default()
        });
        let input = CaptureInput::audio(vec![1; 64], 2.0)?;

        let transcript = engine.transcribe(&input).await?;
        let first = engine.interpret(&UserId::new("u1"), &transcript).await?;
        let second = engine.interpret(&UserId::new("u1"), &transcript).await?;

        assert_eq!(first.transcription(), Some("My head hurts"));
        assert!(first.symptoms().unwrap().contains("Itching"));
        assert_ne!(first.id(), second.id());
        Ok(())
    }

    #[tokio::test]
    async fn test_transcribe_rejects_image_input() {
        let (engine, _) = engine(FixedBackend::default());
        let input = CaptureInput::image(vec![1; 8], "image/png").unwrap();

        assert!(matches!(
            engine.transcribe(&input).await,
            Err(PipelineError::InvalidInputKind(_))
        ));
    }
}
