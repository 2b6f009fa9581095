use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::input::{ensure_image_mime, CaptureInput, ImageFile};
use super::state::{CaptureState, FailureReason};
use super::timer::ElapsedCounter;
use crate::analysis::AnalysisEngine;
use crate::audio::{AudioBackend, AudioClip, AudioFrame, Permission};
use crate::config::CaptureConfig;
use crate::error::{PipelineError, Result};
use crate::records::{DiagnosticResult, UserId};

/// Microphone resources held while `Capturing`
struct ActiveRecording {
    backend: Box<dyn AudioBackend>,
    collector: JoinHandle<Vec<AudioFrame>>,
    counter: ElapsedCounter,
}

impl ActiveRecording {
    async fn release(mut self) {
        self.counter.stop();
        self.collector.abort();
        if let Err(e) = self.backend.stop().await {
            error!("Failed to stop {} microphone: {}", self.backend.name(), e);
        }
    }
}

struct Inner {
    state: CaptureState,
    input: Option<CaptureInput>,
    recording: Option<ActiveRecording>,
    last_error: Option<String>,
}

/// One capture → analyze lifecycle
///
/// Methods take `&self`, so a display surface can cancel or observe while another
/// task awaits a capture step. The lock is never held across an await.
pub struct CaptureSession {
    id: Uuid,
    owner: UserId,
    guest: bool,
    config: CaptureConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CaptureState>,
    elapsed_tx: watch::Sender<u64>,
    result_tx: watch::Sender<Option<DiagnosticResult>>,
}

impl CaptureSession {
    pub fn new(owner: UserId, config: CaptureConfig) -> Self {
        Self::with_state(owner, false, config, CaptureState::Idle, None)
    }

    /// Session opened while signed out; its result is never saved
    pub fn guest(config: CaptureConfig) -> Self {
        Self::with_state(UserId::guest(), true, config, CaptureState::Idle, None)
    }

    /// A session whose input was captured elsewhere; starts in `Ready`
    pub fn from_input(owner: UserId, config: CaptureConfig, input: CaptureInput) -> Result<Self> {
        input.validate()?;
        Ok(Self::with_state(owner, false, config, CaptureState::Ready, Some(input)))
    }

    fn with_state(
        owner: UserId,
        guest: bool,
        config: CaptureConfig,
        state: CaptureState,
        input: Option<CaptureInput>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Opening capture session {} for {}", id, owner);

        Self {
            id,
            owner,
            guest,
            config,
            inner: Mutex::new(Inner {
                state,
                input,
                recording: None,
                last_error: None,
            }),
            state_tx: watch::channel(state).0,
            elapsed_tx: watch::channel(0).0,
            result_tx: watch::channel(None).0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Whether the session was opened without a signed-in user
    pub fn is_guest(&self) -> bool {
        self.guest
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    /// Recording time in whole seconds
    pub fn elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    /// `None` until the session completes
    pub fn subscribe_result(&self) -> watch::Receiver<Option<DiagnosticResult>> {
        self.result_tx.subscribe()
    }

    pub fn result(&self) -> Option<DiagnosticResult> {
        self.result_tx.borrow().clone()
    }

    /// The captured input, once validated
    pub fn input(&self) -> Option<CaptureInput> {
        self.lock().input.clone()
    }

    /// Message of the most recent failure, retryable or not
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Read and validate an image file, ending in `Ready`
    pub async fn begin_image_capture(&self, file: ImageFile) -> Result<()> {
        self.enter_capturing("begin image capture").await?;
        info!("Session {}: reading image {} ({})", self.id, file.name, file.mime_type);

        if let Err(e) = ensure_image_mime(&file.mime_type) {
            return Err(self.fail(e).await);
        }

        let mime_type = file.mime_type.clone();
        let bytes = match file.read(self.config.max_image_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e).await),
        };
        self.advance(CaptureState::Capturing, CaptureState::Validating)?;

        let input = match CaptureInput::image(bytes, mime_type) {
            Ok(input) => input,
            Err(e) => return Err(self.fail(e).await),
        };

        self.become_ready(input)
    }

    /// Ask for the microphone and start recording
    ///
    /// Suspends while the permission prompt is open. On grant the session moves to
    /// `Capturing` and the elapsed counter starts at 0.
    pub async fn begin_audio_capture(&self, mut backend: Box<dyn AudioBackend>) -> Result<()> {
        let state = self.state();
        if state != CaptureState::Idle {
            return Err(self.misuse("begin audio capture", state).await);
        }

        info!("Session {}: requesting {} microphone access", self.id, backend.name());
        if backend.request_access().await == Permission::Denied {
            warn!("Session {}: microphone access denied", self.id);
            return Err(self.fail(PipelineError::PermissionDenied).await);
        }
        if self.state().is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => return Err(self.fail(PipelineError::AudioDevice(e.to_string())).await),
        };
        let collector = tokio::spawn(collect_frames(frames));

        let rejected = {
            let mut inner = self.lock();
            if inner.state == CaptureState::Idle {
                let counter = ElapsedCounter::start(self.elapsed_tx.clone());
                inner.recording = Some(ActiveRecording {
                    backend,
                    collector,
                    counter,
                });
                self.set_state(&mut inner, CaptureState::Capturing);
                None
            } else {
                Some((backend, collector, inner.state))
            }
        };

        match rejected {
            None => {
                info!("Session {}: recording", self.id);
                Ok(())
            }
            // Cancelled while the device was starting
            Some((mut backend, collector, state)) => {
                collector.abort();
                if let Err(e) = backend.stop().await {
                    error!("Failed to stop {} microphone: {}", backend.name(), e);
                }
                if state.is_cancelled() {
                    Err(PipelineError::Cancelled)
                } else {
                    Err(self.misuse("begin audio capture", state).await)
                }
            }
        }
    }

    /// Stop recording and validate the buffered audio, ending in `Ready`
    ///
    /// Returns the final value of the elapsed counter.
    pub async fn end_audio_capture(&self) -> Result<u64> {
        let recording = {
            let mut inner = self.lock();
            match (inner.state, inner.recording.take()) {
                (CaptureState::Capturing, Some(recording)) => {
                    self.set_state(&mut inner, CaptureState::Validating);
                    Ok(recording)
                }
                (state, other) => {
                    inner.recording = other;
                    Err(state)
                }
            }
        };
        let recording = match recording {
            Ok(recording) => recording,
            Err(state) => return Err(self.misuse("end audio capture", state).await),
        };

        let ActiveRecording {
            mut backend,
            collector,
            counter,
        } = recording;
        let elapsed = counter.stop();
        if let Err(e) = backend.stop().await {
            warn!("Failed to stop {} microphone: {}", backend.name(), e);
        }
        let frames = match collector.await {
            Ok(frames) => frames,
            Err(e) => return Err(self.fail(PipelineError::AudioDevice(e.to_string())).await),
        };
        if self.state().is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let clip = match AudioClip::from_frames(&frames) {
            Some(clip) if clip.duration_seconds > 0.0 => clip,
            _ => {
                let e = PipelineError::InvalidInputKind("no audio was captured".to_string());
                return Err(self.fail(e).await);
            }
        };
        let bytes = match clip.to_wav_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(PipelineError::AudioDevice(e.to_string())).await),
        };
        let input = match CaptureInput::audio(bytes, clip.duration_seconds) {
            Ok(input) => input,
            Err(e) => return Err(self.fail(e).await),
        };

        info!(
            "Session {}: recorded {:.1}s of audio in {}s",
            self.id, clip.duration_seconds, elapsed
        );
        self.become_ready(input)?;
        Ok(elapsed)
    }

    /// Abandon the session from any non-terminal state
    ///
    /// An analysis already in flight keeps running, but its result is dropped on arrival.
    pub async fn cancel(&self) -> Result<()> {
        let recording = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                let state = inner.state;
                drop(inner);
                warn!("Session {}: cancel ignored, session already {}", self.id, state);
                return Err(PipelineError::InvalidStateTransition {
                    action: "cancel",
                    state: state.to_string(),
                });
            }
            inner.input = None;
            inner.last_error = Some(PipelineError::Cancelled.to_string());
            self.set_state(&mut inner, CaptureState::Failed(FailureReason::Cancelled));
            inner.recording.take()
        };

        if let Some(recording) = recording {
            recording.release().await;
        }
        info!("Session {}: cancelled", self.id);
        Ok(())
    }

    /// Run the engine on the captured input; at most one call may be in flight
    ///
    /// Retryable engine failures put the session back in `Ready`.
    pub async fn analyze(&self, engine: &AnalysisEngine) -> Result<DiagnosticResult> {
        let input = {
            let mut inner = self.lock();
            match (inner.state, inner.input.clone()) {
                (CaptureState::Ready, Some(input)) => {
                    self.set_state(&mut inner, CaptureState::Analyzing);
                    Ok(input)
                }
                (state, _) => Err(state),
            }
        };
        let input = match input {
            Ok(input) => input,
            Err(CaptureState::Analyzing) => return Err(PipelineError::AlreadyAnalyzing),
            Err(state) if state.is_cancelled() => return Err(PipelineError::Cancelled),
            Err(state) => return Err(self.misuse("analyze", state).await),
        };

        info!("Session {}: analyzing {} input", self.id, input.kind());
        let outcome = engine.analyze(&self.owner, &input).await;

        let mut inner = self.lock();
        if inner.state.is_cancelled() {
            info!("Session {}: discarding analysis result after cancel", self.id);
            return Err(PipelineError::Cancelled);
        }

        match outcome {
            Ok(result) => {
                self.set_state(&mut inner, CaptureState::Complete);
                inner.last_error = None;
                self.result_tx.send_replace(Some(result.clone()));
                info!(
                    "Session {}: complete ({}, {})",
                    self.id,
                    result.diagnosis(),
                    result.confidence()
                );
                Ok(result)
            }
            Err(e) if e.is_recoverable() => {
                warn!("Session {}: analysis failed, input kept for retry: {}", self.id, e);
                inner.last_error = Some(e.to_string());
                self.set_state(&mut inner, CaptureState::Ready);
                Err(e)
            }
            Err(e) => {
                error!("Session {}: analysis rejected input: {}", self.id, e);
                inner.last_error = Some(e.to_string());
                self.set_state(&mut inner, CaptureState::Failed(FailureReason::of(&e)));
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: CaptureState) {
        debug!("Session {}: {} -> {}", self.id, inner.state, state);
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    async fn enter_capturing(&self, action: &'static str) -> Result<()> {
        let state = self.state();
        if state != CaptureState::Idle {
            return Err(self.misuse(action, state).await);
        }
        self.advance(CaptureState::Idle, CaptureState::Capturing)
    }

    /// Move `from -> to`, or report a cancel that happened during the last await
    fn advance(&self, from: CaptureState, to: CaptureState) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == from {
            self.set_state(&mut inner, to);
            Ok(())
        } else if inner.state.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Err(PipelineError::InvalidStateTransition {
                action: "advance capture",
                state: inner.state.to_string(),
            })
        }
    }

    fn become_ready(&self, input: CaptureInput) -> Result<()> {
        let mut inner = self.lock();
        if inner.state.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        inner.input = Some(input);
        self.set_state(&mut inner, CaptureState::Ready);
        Ok(())
    }

    /// Caller misuse: ends a live session, leaves a finished one alone
    async fn misuse(&self, action: &'static str, state: CaptureState) -> PipelineError {
        error!("Session {}: cannot {} while {}", self.id, action, state);
        self.fail(PipelineError::InvalidStateTransition {
            action,
            state: state.to_string(),
        })
        .await
    }

    /// Move a live session to `Failed`, releasing the microphone if held
    async fn fail(&self, error: PipelineError) -> PipelineError {
        let recording = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                None
            } else {
                inner.last_error = Some(error.to_string());
                inner.input = None;
                self.set_state(&mut inner, CaptureState::Failed(FailureReason::of(&error)));
                inner.recording.take()
            }
        };

        if let Some(recording) = recording {
            recording.release().await;
        }
        if error.is_user_facing() {
            warn!("Session {}: {}", self.id, error);
        }
        error
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let recording = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .recording
            .take();

        if let Some(recording) = recording {
            debug!("Session {} dropped while recording, releasing microphone", self.id);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(recording.release());
                }
                Err(_) => recording.collector.abort(),
            }
        }
    }
}

async fn collect_frames(mut frames: mpsc::Receiver<AudioFrame>) -> Vec<AudioFrame> {
    let mut buffered = Vec::new();
    while let Some(frame) = frames.recv().await {
        buffered.push(frame);
    }
    buffered
}
