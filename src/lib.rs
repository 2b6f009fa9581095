pub mod analysis;
pub mod audio;
pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod presenter;
pub mod records;

pub use analysis::{AnalysisBackend, AnalysisEngine, Finding, SimulatedBackend};
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioClip, AudioFrame, AudioSource,
    Permission, SyntheticMicrophone, WavFileBackend,
};
pub use auth::{AuthProvider, AuthState, StaticAuth};
pub use capture::{
    format_elapsed, CaptureInput, CaptureSession, CaptureState, FailureReason, ImageFile,
    ImageSource,
};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{AnalysisPipeline, Persisted};
pub use presenter::{
    image_preview_data_url, modality_description, summary_counts, urgency_label, ConfidenceBand,
    RecordCard, ResultPresenter, SummaryCounts,
};
pub use records::{
    Confidence, DiagnosticResult, Findings, MemoryRepository, Modality, ModalityFilter,
    RecordFilter, RecordRepository, RecordRow, ResultStore, SqliteRepository, Urgency, UserId,
};
