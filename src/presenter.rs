//! Read-only projections for display surfaces
//!
//! Nothing here mutates a session or the store; a dashboard or records list
//! builds its view from these values.
use base64::Engine;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::capture::{CaptureInput, CaptureSession, CaptureState};
use crate::records::{DiagnosticResult, Modality, Urgency};

/// Confidence at or above this counts as high confidence
pub const HIGH_CONFIDENCE: f64 = 80.0;
const MODERATE_CONFIDENCE: f64 = 60.0;

/// Follows one session's result
pub struct ResultPresenter {
    results: watch::Receiver<Option<DiagnosticResult>>,
    states: watch::Receiver<CaptureState>,
}

impl ResultPresenter {
    pub fn for_session(session: &CaptureSession) -> Self {
        Self {
            results: session.subscribe_result(),
            states: session.watch_state(),
        }
    }

    /// `None` while the analysis is pending
    pub fn latest(&self) -> Option<DiagnosticResult> {
        self.results.borrow().clone()
    }

    /// Wait until the session publishes a result
    ///
    /// Returns `None` if the session fails or is dropped first. A retryable
    /// analysis failure keeps waiting, since the caller may analyze again.
    pub async fn wait_for_result(&mut self) -> Option<DiagnosticResult> {
        loop {
            if let Some(result) = self.results.borrow_and_update().clone() {
                return Some(result);
            }
            if matches!(*self.states.borrow_and_update(), CaptureState::Failed(_)) {
                return None;
            }

            tokio::select! {
                changed = self.results.changed() => {
                    if changed.is_err() {
                        return self.results.borrow().clone();
                    }
                }
                changed = self.states.changed() => {
                    if changed.is_err() {
                        return self.results.borrow().clone();
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModalityCounts {
    pub image: usize,
    pub voice: usize,
}

/// Dashboard tallies over a set of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCounts {
    pub total: usize,
    pub by_modality: ModalityCounts,
    pub high_confidence_count: usize,
}

pub fn summary_counts(records: &[DiagnosticResult]) -> SummaryCounts {
    records.iter().fold(SummaryCounts::default(), |mut counts, record| {
        counts.total += 1;
        match record.modality() {
            Modality::Image => counts.by_modality.image += 1,
            Modality::Voice => counts.by_modality.voice += 1,
        }
        if record.confidence().value() >= HIGH_CONFIDENCE {
            counts.high_confidence_count += 1;
        }
        counts
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Moderate,
    Low,
}

impl ConfidenceBand {
    pub fn of(confidence: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceBand::High
        } else if confidence >= MODERATE_CONFIDENCE {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }
}

pub fn urgency_label(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Low => "Low Priority",
        Urgency::Medium => "Medium Priority",
        Urgency::High => "High Priority",
        Urgency::Unknown => "Unknown Priority",
    }
}

pub fn modality_description(modality: Modality) -> &'static str {
    match modality {
        Modality::Image => "medical image",
        Modality::Voice => "voice symptoms",
    }
}

/// One row of the records list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCard {
    pub id: Uuid,
    pub diagnosis: String,
    pub modality: Modality,
    pub description: &'static str,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub urgency: &'static str,
    /// `YYYY-MM-DD`, UTC
    pub date: String,
    /// At most two
    pub recommendations: Vec<String>,
}

impl From<&DiagnosticResult> for RecordCard {
    fn from(record: &DiagnosticResult) -> Self {
        Self {
            id: record.id(),
            diagnosis: record.diagnosis().to_string(),
            modality: record.modality(),
            description: modality_description(record.modality()),
            confidence: record.confidence().value(),
            band: ConfidenceBand::of(record.confidence().value()),
            urgency: urgency_label(record.urgency()),
            date: record.created_at().format("%Y-%m-%d").to_string(),
            recommendations: record.recommendations().iter().take(2).cloned().collect(),
        }
    }
}

/// `data:` URL for showing a captured image; `None` for audio
pub fn image_preview_data_url(input: &CaptureInput) -> Option<String> {
    match input {
        CaptureInput::Image { bytes, mime_type } => Some(format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )),
        CaptureInput::Audio { .. } => None,
    }
}
