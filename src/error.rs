//! Error types for the analysis pipeline
//!
//! Capture-time errors end the session, analysis and storage errors are
//! retryable by the caller. The pipeline itself never retries.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInputKind(String),

    #[error("Microphone access denied")]
    PermissionDenied,

    #[error("Invalid state transition: cannot {action} while {state}")]
    InvalidStateTransition { action: &'static str, state: String },

    #[error("Capture cancelled")]
    Cancelled,

    #[error("An analysis is already in progress for this session")]
    AlreadyAnalyzing,

    #[error("Analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Transcription is empty")]
    EmptyTranscription,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Record {record_id} is owned by another user")]
    OwnerMismatch { record_id: String },

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl PipelineError {
    pub(crate) fn analysis_failed(reason: impl Into<String>) -> Self {
        Self::AnalysisFailed {
            reason: reason.into(),
        }
    }

    /// Whether the caller may re-invoke the failed operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AnalysisFailed { .. } | Self::EmptyTranscription | Self::StorageUnavailable(_)
        )
    }

    /// Contract violations are logged, everything else is shown to the user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::InvalidStateTransition { .. }
                | Self::AlreadyAnalyzing
                | Self::OwnerMismatch { .. }
        )
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(error: rusqlite::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        Self::StorageUnavailable(format!("malformed record: {}", error))
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PipelineError>;
