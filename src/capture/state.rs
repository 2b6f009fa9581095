use serde::Serialize;
use std::fmt;

use crate::error::PipelineError;

/// Why a session ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidInputKind,
    PermissionDenied,
    InvalidStateTransition,
    Cancelled,
    AudioDevice,
    Io,
}

impl FailureReason {
    pub(crate) fn of(error: &PipelineError) -> Self {
        match error {
            PipelineError::InvalidInputKind(_) => Self::InvalidInputKind,
            PipelineError::PermissionDenied => Self::PermissionDenied,
            PipelineError::Cancelled => Self::Cancelled,
            PipelineError::AudioDevice(_) => Self::AudioDevice,
            PipelineError::Io(_) => Self::Io,
            _ => Self::InvalidStateTransition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum CaptureState {
    Idle,
    Capturing,
    Validating,
    Ready,
    Analyzing,
    Complete,
    Failed(FailureReason),
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Complete | CaptureState::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CaptureState::Failed(FailureReason::Cancelled))
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "idle"),
            CaptureState::Capturing => write!(f, "capturing"),
            CaptureState::Validating => write!(f, "validating"),
            CaptureState::Ready => write!(f, "ready"),
            CaptureState::Analyzing => write!(f, "analyzing"),
            CaptureState::Complete => write!(f, "complete"),
            CaptureState::Failed(reason) => write!(f, "failed ({:?})", reason),
        }
    }
}
