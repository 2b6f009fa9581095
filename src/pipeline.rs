use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisEngine, SimulatedBackend};
use crate::audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource};
use crate::auth::{AuthProvider, AuthState};
use crate::capture::{CaptureSession, CaptureState};
use crate::config::{CaptureConfig, Config};
use crate::error::{PipelineError, Result};
use crate::presenter::{summary_counts, SummaryCounts};
use crate::records::{DiagnosticResult, RecordFilter, ResultStore};

/// What happened to a completed result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Saved,
    /// No signed-in user owns the session
    Skipped,
}

/// Wires auth, capture sessions, the engine and the store together
///
/// Guarantees that only a `Complete` session's result is ever saved, and that
/// history is only served to a signed-in user.
pub struct AnalysisPipeline {
    engine: AnalysisEngine,
    store: ResultStore,
    auth: Arc<dyn AuthProvider>,
    capture: CaptureConfig,
}

impl AnalysisPipeline {
    pub fn new(
        engine: AnalysisEngine,
        store: ResultStore,
        auth: Arc<dyn AuthProvider>,
        capture: CaptureConfig,
    ) -> Self {
        Self {
            engine,
            store,
            auth,
            capture,
        }
    }

    /// Simulated backend plus the configured store
    pub fn from_config(config: &Config, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let backend = Arc::new(SimulatedBackend::new(&config.analysis));
        let engine = AnalysisEngine::new(backend, &config.analysis);
        let store = ResultStore::from_config(&config.storage)?;
        info!(
            "Pipeline ready ({} analysis, {:?} storage)",
            engine.backend_name(),
            config.storage.backend
        );
        Ok(Self::new(engine, store, auth, config.capture.clone()))
    }

    pub fn engine(&self) -> &AnalysisEngine {
        &self.engine
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// New session owned by the signed-in user, or by a guest
    pub fn open_session(&self) -> CaptureSession {
        match self.auth.current() {
            AuthState::SignedIn(user) => CaptureSession::new(user, self.capture.clone()),
            AuthState::Loading | AuthState::SignedOut => {
                CaptureSession::guest(self.capture.clone())
            }
        }
    }

    /// Microphone backend matching the capture configuration
    pub fn microphone(&self, source: AudioSource) -> Result<Box<dyn AudioBackend>> {
        AudioBackendFactory::create(source, AudioBackendConfig::from(&self.capture))
            .map_err(|e| PipelineError::AudioDevice(format!("{:#}", e)))
    }

    pub async fn analyze(&self, session: &CaptureSession) -> Result<DiagnosticResult> {
        session.analyze(&self.engine).await
    }

    /// Save a completed session's result for its owner
    pub async fn persist(&self, session: &CaptureSession) -> Result<Persisted> {
        let result = match (session.state(), session.result()) {
            (CaptureState::Complete, Some(result)) => result,
            (state, _) => {
                return Err(PipelineError::InvalidStateTransition {
                    action: "persist",
                    state: state.to_string(),
                })
            }
        };

        match self.auth.current() {
            AuthState::SignedIn(user) if !session.is_guest() => {
                self.store.save(&user, &result).await?;
                Ok(Persisted::Saved)
            }
            _ => {
                warn!("Session {}: not signed in, result {} not saved", session.id(), result.id());
                Ok(Persisted::Skipped)
            }
        }
    }

    /// Analyze, then persist
    ///
    /// A storage failure after a successful analysis leaves the session `Complete`,
    /// so `persist` can be retried alone.
    pub async fn complete(
        &self,
        session: &CaptureSession,
    ) -> Result<(DiagnosticResult, Persisted)> {
        let result = self.analyze(session).await?;
        let persisted = self.persist(session).await?;
        Ok((result, persisted))
    }

    /// The signed-in user's matching records, newest first; `None` when signed out
    pub async fn history(&self, filter: &RecordFilter) -> Result<Option<Vec<DiagnosticResult>>> {
        match self.auth.current().user() {
            Some(user) => Ok(Some(self.store.query(user, filter).await?)),
            None => Ok(None),
        }
    }

    pub async fn record(&self, id: Uuid) -> Result<Option<DiagnosticResult>> {
        match self.auth.current().user() {
            Some(user) => self.store.get(user, id).await,
            None => Ok(None),
        }
    }

    /// Dashboard tallies over the signed-in user's full history
    pub async fn summary(&self) -> Result<Option<SummaryCounts>> {
        Ok(self
            .history(&RecordFilter::default())
            .await?
            .map(|records| summary_counts(&records)))
    }
}
