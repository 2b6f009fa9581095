// Integration tests for the capture session lifecycle
//
// A counting fake backend stands in for inference so tests can assert whether
// analysis ran at all.

use anyhow::{bail, Result};
use async_trait::async_trait;
use health_analysis::analysis::{AnalysisBackend, AudioPayload, Finding, ImagePayload};
use health_analysis::audio::{AudioBackendConfig, SyntheticMicrophone};
use health_analysis::config::{AnalysisConfig, CaptureConfig};
use health_analysis::{
    AnalysisEngine, CaptureInput, CaptureSession, CaptureState, FailureReason, ImageFile,
    Modality, PipelineError, ResultPresenter, Urgency, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails the first `failures` calls, then answers after `latency`
struct CountingBackend {
    calls: AtomicUsize,
    failures: usize,
    latency: Duration,
}

impl CountingBackend {
    fn new() -> Arc<Self> {
        Self::with(0, Duration::ZERO)
    }

    fn with(failures: usize, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
            latency,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> Result<Finding> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if call < self.failures {
            bail!("inference service returned 503");
        }
        Ok(Finding {
            confidence: 88.0,
            diagnosis: "Contact dermatitis".to_string(),
            details: "Localized redness".to_string(),
            recommendations: vec!["Avoid the irritant".to_string()],
            urgency: Some(Urgency::Low),
            symptoms: vec!["Itching".to_string(), "Redness".to_string()],
        })
    }
}

#[async_trait]
impl AnalysisBackend for CountingBackend {
    async fn classify_image(&self, _image: ImagePayload<'_>) -> Result<Finding> {
        self.answer().await
    }

    async fn transcribe(&self, _audio: AudioPayload<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("My skin is itchy and red".to_string())
    }

    async fn interpret(&self, _transcript: &str) -> Result<Finding> {
        self.answer().await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn engine(backend: Arc<CountingBackend>) -> AnalysisEngine {
    AnalysisEngine::new(backend, &AnalysisConfig::default())
}

fn session() -> CaptureSession {
    CaptureSession::new(UserId::new("patient-1"), CaptureConfig::default())
}

fn microphone() -> Box<SyntheticMicrophone> {
    Box::new(SyntheticMicrophone::new(AudioBackendConfig::default()))
}

#[tokio::test]
async fn test_image_capture_then_analyze() -> Result<()> {
    let backend = CountingBackend::new();
    let engine = engine(backend.clone());
    let session = session();

    session
        .begin_image_capture(ImageFile::from_bytes("mole.png", "image/png", vec![9; 512]))
        .await?;
    assert_eq!(session.state(), CaptureState::Ready);

    let result = session.analyze(&engine).await?;

    assert_eq!(session.state(), CaptureState::Complete);
    assert_eq!(result.modality(), Modality::Image);
    assert!((0.0..=100.0).contains(&result.confidence().value()));
    assert!(!result.diagnosis().is_empty());
    assert!(matches!(result.urgency(), Urgency::Low | Urgency::Medium | Urgency::High));
    assert!(result.transcription().is_none());
    assert!(result.symptoms().is_none());
    assert_eq!(result.user_id(), &UserId::new("patient-1"));
    assert_eq!(session.result(), Some(result));
    assert_eq!(backend.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_image_from_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rash.jpg");
    std::fs::write(&path, vec![0xFF; 2048])?;
    let session = session();

    session.begin_image_capture(ImageFile::from_path(&path)).await?;

    let input = session.input().expect("input");
    assert_eq!(input.bytes().len(), 2048);
    assert!(matches!(
        input,
        CaptureInput::Image { ref mime_type, .. } if mime_type == "image/jpeg"
    ));
    Ok(())
}

#[tokio::test]
async fn test_non_image_file_fails_session() {
    let session = session();

    let err = session
        .begin_image_capture(ImageFile::from_bytes("report.pdf", "application/pdf", vec![1; 64]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInputKind(_)));
    assert_eq!(session.state(), CaptureState::Failed(FailureReason::InvalidInputKind));
    assert!(session.last_error().is_some());
}

#[tokio::test]
async fn test_oversized_image_fails_session() {
    let config = CaptureConfig {
        max_image_bytes: 1024,
        ..CaptureConfig::default()
    };
    let session = CaptureSession::new(UserId::new("patient-1"), config);

    let err = session
        .begin_image_capture(ImageFile::from_bytes("big.png", "image/png", vec![1; 1025]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInputKind(_)));
    assert!(session.input().is_none());
}

#[tokio::test]
async fn test_oversized_file_on_disk_is_not_loaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scan.png");
    // Sparse 4 GiB file; only its metadata is read
    std::fs::File::create(&path)?.set_len(4 << 30)?;
    let session = session();

    let err = session
        .begin_image_capture(ImageFile::from_path(&path))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInputKind(_)));
    assert_eq!(session.state(), CaptureState::Failed(FailureReason::InvalidInputKind));
    assert!(session.input().is_none());
    Ok(())
}

#[tokio::test]
async fn test_cancel_while_image_is_read() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rash.png");
    std::fs::write(&path, vec![3; 4096])?;
    let session = session();

    // The read suspends on the blocking pool, so cancel lands mid-capture
    let (begun, cancelled) = tokio::join!(
        session.begin_image_capture(ImageFile::from_path(&path)),
        session.cancel(),
    );

    cancelled?;
    assert!(matches!(begun, Err(PipelineError::Cancelled)));
    assert_eq!(session.state(), CaptureState::Failed(FailureReason::Cancelled));
    assert!(session.input().is_none());
    Ok(())
}

#[tokio::test]
async fn test_empty_image_never_reaches_backend() {
    let backend = CountingBackend::new();
    let session = session();

    let err = session
        .begin_image_capture(ImageFile::from_bytes("empty.png", "image/png", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInputKind(_)));

    assert!(session.analyze(&engine(backend.clone())).await.is_err());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unreadable_image_path() {
    let session = session();

    let err = session
        .begin_image_capture(ImageFile::from_path("/nonexistent/scan.png"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Io(_)));
    assert_eq!(session.state(), CaptureState::Failed(FailureReason::Io));
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_counter_matches_recording_length() -> Result<()> {
    for seconds in [1u64, 3, 7] {
        let session = session();
        let elapsed = session.elapsed();

        session.begin_audio_capture(microphone()).await?;
        assert_eq!(session.state(), CaptureState::Capturing);
        assert_eq!(*elapsed.borrow(), 0);

        tokio::time::sleep(Duration::from_secs(seconds)).await;
        let reported = session.end_audio_capture().await?;

        assert_eq!(reported, seconds);
        assert_eq!(*elapsed.borrow(), seconds);
        assert_eq!(session.state(), CaptureState::Ready);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recording_becomes_wav_input() -> Result<()> {
    let session = session();
    session.begin_audio_capture(microphone()).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.end_audio_capture().await?;

    match session.input().expect("input") {
        CaptureInput::Audio {
            bytes,
            duration_seconds,
        } => {
            assert_eq!(&bytes[0..4], b"RIFF");
            assert!(duration_seconds >= 2.0);
        }
        other => panic!("expected audio input, got {}", other.kind()),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_voice_analysis_carries_transcription() -> Result<()> {
    let backend = CountingBackend::new();
    let session = session();
    session.begin_audio_capture(microphone()).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.end_audio_capture().await?;

    let result = session.analyze(&engine(backend.clone())).await?;

    assert_eq!(result.modality(), Modality::Voice);
    assert_eq!(result.transcription(), Some("My skin is itchy and red"));
    assert_eq!(result.symptoms().map(|s| s.len()), Some(2));
    assert_eq!(backend.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_immediately_after_begin() -> Result<()> {
    let backend = CountingBackend::new();
    let session = session();
    let elapsed = session.elapsed();

    session.begin_audio_capture(microphone()).await?;
    session.cancel().await?;

    assert_eq!(session.state(), CaptureState::Failed(FailureReason::Cancelled));
    assert!(matches!(
        session.analyze(&engine(backend.clone())).await,
        Err(PipelineError::Cancelled)
    ));
    assert_eq!(backend.calls(), 0);
    assert!(session.result().is_none());

    // Counter is stopped
    let stopped_at = *elapsed.borrow();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*elapsed.borrow(), stopped_at);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_analysis_discards_result() -> Result<()> {
    let backend = CountingBackend::with(0, Duration::from_secs(3));
    let engine = engine(backend.clone());
    let session = CaptureSession::from_input(
        UserId::new("patient-1"),
        CaptureConfig::default(),
        CaptureInput::image(vec![5; 512], "image/png")?,
    )?;

    let (analyzed, cancelled) = tokio::join!(session.analyze(&engine), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        session.cancel().await
    });

    cancelled?;
    assert!(matches!(analyzed, Err(PipelineError::Cancelled)));
    assert_eq!(backend.calls(), 1);
    assert!(session.result().is_none());
    assert!(session.state().is_cancelled());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_analyze_is_rejected() -> Result<()> {
    let backend = CountingBackend::with(0, Duration::from_secs(2));
    let engine = engine(backend.clone());
    let session = CaptureSession::from_input(
        UserId::new("patient-1"),
        CaptureConfig::default(),
        CaptureInput::image(vec![5; 512], "image/png")?,
    )?;

    let (first, second) = tokio::join!(session.analyze(&engine), session.analyze(&engine));

    assert!(first.is_ok());
    assert!(matches!(second, Err(PipelineError::AlreadyAnalyzing)));
    assert_eq!(backend.calls(), 1);
    assert_eq!(session.state(), CaptureState::Complete);
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_allows_retry() -> Result<()> {
    let backend = CountingBackend::with(1, Duration::ZERO);
    let engine = engine(backend.clone());
    let session = CaptureSession::from_input(
        UserId::new("patient-1"),
        CaptureConfig::default(),
        CaptureInput::image(vec![5; 512], "image/png")?,
    )?;

    let err = session.analyze(&engine).await.unwrap_err();
    assert!(matches!(err, PipelineError::AnalysisFailed { .. }));
    assert!(err.is_recoverable());
    assert_eq!(session.state(), CaptureState::Ready);
    assert!(session.last_error().unwrap().contains("503"));

    let result = session.analyze(&engine).await?;
    assert_eq!(result.diagnosis(), "Contact dermatitis");
    assert_eq!(backend.calls(), 2);
    assert!(session.last_error().is_none());
    Ok(())
}

#[tokio::test]
async fn test_permission_denied_fails_session() {
    let session = session();

    let err = session
        .begin_audio_capture(Box::new(SyntheticMicrophone::denied(AudioBackendConfig::default())))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PermissionDenied));
    assert!(err.is_user_facing());
    assert_eq!(session.state(), CaptureState::Failed(FailureReason::PermissionDenied));
}

#[tokio::test(start_paused = true)]
async fn test_second_end_audio_capture_is_misuse() -> Result<()> {
    let session = session();
    session.begin_audio_capture(microphone()).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.end_audio_capture().await?;
    assert_eq!(session.state(), CaptureState::Ready);

    let err = session.end_audio_capture().await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidStateTransition { .. }));
    assert_eq!(
        session.state(),
        CaptureState::Failed(FailureReason::InvalidStateTransition)
    );
    assert!(session.input().is_none());
    Ok(())
}

#[tokio::test]
async fn test_end_without_begin_is_misuse() {
    let session = session();

    let err = session.end_audio_capture().await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidStateTransition { .. }));
    assert!(!err.is_user_facing());
    assert_eq!(
        session.state(),
        CaptureState::Failed(FailureReason::InvalidStateTransition)
    );
}

#[tokio::test]
async fn test_cancel_after_complete_leaves_result() -> Result<()> {
    let engine = engine(CountingBackend::new());
    let session = CaptureSession::from_input(
        UserId::new("patient-1"),
        CaptureConfig::default(),
        CaptureInput::image(vec![5; 512], "image/png")?,
    )?;
    session.analyze(&engine).await?;

    assert!(matches!(
        session.cancel().await,
        Err(PipelineError::InvalidStateTransition { .. })
    ));
    assert_eq!(session.state(), CaptureState::Complete);
    assert!(session.result().is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_presenter_waits_for_result() -> Result<()> {
    let engine = engine(CountingBackend::with(0, Duration::from_secs(3)));
    let session = CaptureSession::from_input(
        UserId::new("patient-1"),
        CaptureConfig::default(),
        CaptureInput::image(vec![5; 512], "image/png")?,
    )?;
    let mut presenter = ResultPresenter::for_session(&session);
    assert!(presenter.latest().is_none());

    let (analyzed, presented) = tokio::join!(session.analyze(&engine), presenter.wait_for_result());

    assert_eq!(presented, Some(analyzed?));
    assert!(presenter.latest().is_some());
    Ok(())
}

#[tokio::test]
async fn test_presenter_gives_up_on_failed_session() {
    let session = session();
    let mut presenter = ResultPresenter::for_session(&session);

    let _ = session
        .begin_audio_capture(Box::new(SyntheticMicrophone::denied(AudioBackendConfig::default())))
        .await;

    assert_eq!(presenter.wait_for_result().await, None);
}
