//! Diagnostic result records
//!
//! A `DiagnosticResult` is built by the analysis engine and never changes after
//! that. Voice-only fields live in the `Findings::Voice` variant so an image
//! result cannot carry a transcription.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Opaque owner reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Ephemeral owner for sessions opened while signed out
    pub(crate) fn guest() -> Self {
        Self(format!("guest-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Voice,
}

impl Modality {
    pub fn label(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Voice => "voice",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Backend-assigned urgency. `Unknown` stands in for a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Unknown => "unknown",
        }
    }

    fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") | Some("unknown") => Ok(Urgency::Unknown),
            Some("low") => Ok(Urgency::Low),
            Some("medium") => Ok(Urgency::Medium),
            Some("high") => Ok(Urgency::High),
            Some(other) => Err(PipelineError::StorageUnavailable(format!(
                "malformed record: unknown urgency {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage in [0, 100] with one decimal place
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Round to one decimal and clamp into range. Returns `None` for NaN/infinity.
    pub fn clamped(raw: f64) -> Option<Self> {
        if !raw.is_finite() {
            return None;
        }
        let rounded = (raw * 10.0).round() / 10.0;
        Some(Self(rounded.clamp(0.0, 100.0)))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Modality-specific part of a result
#[derive(Debug, Clone, PartialEq)]
pub enum Findings {
    Image,
    Voice {
        transcription: String,
        symptoms: BTreeSet<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticResult {
    id: Uuid,
    user_id: UserId,
    confidence: Confidence,
    diagnosis: String,
    details: String,
    recommendations: Vec<String>,
    urgency: Urgency,
    findings: Findings,
    created_at: DateTime<Utc>,
}

/// Validated fields shared by both modalities
#[derive(Debug, Clone)]
pub(crate) struct Assessment {
    pub confidence: Confidence,
    pub diagnosis: String,
    pub details: String,
    pub recommendations: Vec<String>,
    pub urgency: Urgency,
}

impl DiagnosticResult {
    pub(crate) fn create(
        user_id: UserId,
        assessment: Assessment,
        findings: Findings,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            confidence: assessment.confidence,
            diagnosis: assessment.diagnosis,
            details: assessment.details,
            recommendations: assessment.recommendations,
            urgency: assessment.urgency,
            findings,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn modality(&self) -> Modality {
        match self.findings {
            Findings::Image => Modality::Image,
            Findings::Voice { .. } => Modality::Voice,
        }
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn diagnosis(&self) -> &str {
        &self.diagnosis
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Highest priority first
    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    pub fn findings(&self) -> &Findings {
        &self.findings
    }

    pub fn transcription(&self) -> Option<&str> {
        match &self.findings {
            Findings::Voice { transcription, .. } => Some(transcription),
            Findings::Image => None,
        }
    }

    pub fn symptoms(&self) -> Option<&BTreeSet<String>> {
        match &self.findings {
            Findings::Voice { symptoms, .. } => Some(symptoms),
            Findings::Image => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Case-insensitive substring match against the diagnosis and modality label
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.diagnosis.to_lowercase().contains(&needle) || self.modality().label().contains(&needle)
    }
}

/// Flat serialized form exchanged with the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub modality: Modality,
    pub confidence_score: f64,
    pub diagnosis: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    /// RFC 3339, UTC, fixed nanosecond precision so text order is time order
    pub created_at: String,
}

impl From<&DiagnosticResult> for RecordRow {
    fn from(result: &DiagnosticResult) -> Self {
        let (symptoms, transcription) = match &result.findings {
            Findings::Image => (None, None),
            Findings::Voice {
                transcription,
                symptoms,
            } => (
                Some(symptoms.iter().cloned().collect()),
                Some(transcription.clone()),
            ),
        };

        Self {
            id: result.id.to_string(),
            user_id: result.user_id.to_string(),
            modality: result.modality(),
            confidence_score: result.confidence.value(),
            diagnosis: result.diagnosis.clone(),
            details: result.details.clone(),
            recommendations: result.recommendations.clone(),
            urgency: Some(result.urgency.as_str().to_string()),
            symptoms,
            transcription,
            created_at: result.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
    }
}

impl TryFrom<RecordRow> for DiagnosticResult {
    type Error = PipelineError;

    /// Rehydrate a stored record, rejecting rows that break the modality invariant
    fn try_from(row: RecordRow) -> Result<Self> {
        let malformed = |what: String| {
            PipelineError::StorageUnavailable(format!("malformed record {}: {}", row.id, what))
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| malformed(e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| malformed(e.to_string()))?
            .with_timezone(&Utc);
        let confidence = Confidence::clamped(row.confidence_score)
            .ok_or_else(|| malformed("non-finite confidence".to_string()))?;
        if row.diagnosis.trim().is_empty() {
            return Err(malformed("empty diagnosis".to_string()));
        }

        let findings = match row.modality {
            Modality::Image => {
                if row.transcription.is_some() || row.symptoms.is_some() {
                    return Err(malformed("image record carries voice fields".to_string()));
                }
                Findings::Image
            }
            Modality::Voice => Findings::Voice {
                transcription: row
                    .transcription
                    .clone()
                    .ok_or_else(|| malformed("voice record without transcription".to_string()))?,
                symptoms: row.symptoms.clone().unwrap_or_default().into_iter().collect(),
            },
        };

        Ok(Self {
            id,
            user_id: UserId::new(row.user_id.clone()),
            confidence,
            diagnosis: row.diagnosis.clone(),
            details: row.details.clone(),
            recommendations: row.recommendations.clone(),
            urgency: Urgency::parse(row.urgency.as_deref())?,
            findings,
            created_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn result_at(
        user: &str,
        modality: Modality,
        diagnosis: &str,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> DiagnosticResult {
        let findings = match modality {
            Modality::Image => Findings::Image,
            Modality::Voice => Findings::Voice {
                transcription: format!("I think I have {}", diagnosis),
                symptoms: ["Nausea".to_string()].into_iter().collect(),
            },
        };
        DiagnosticResult::create(
            UserId::new(user),
            Assessment {
                confidence: Confidence::clamped(confidence).unwrap(),
                diagnosis: diagnosis.to_string(),
                details: String::new(),
                recommendations: vec!["Rest".to_string(), "Hydrate".to_string()],
                urgency: Urgency::Low,
            },
            findings,
            created_at,
        )
    }
}
