use serde::{Deserialize, Serialize};

use super::model::{DiagnosticResult, Modality, RecordRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalityFilter {
    #[default]
    All,
    Image,
    Voice,
}

impl ModalityFilter {
    pub fn admits(&self, modality: Modality) -> bool {
        match self {
            ModalityFilter::All => true,
            ModalityFilter::Image => modality == Modality::Image,
            ModalityFilter::Voice => modality == Modality::Voice,
        }
    }
}

/// History search options. Unset fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordFilter {
    pub text_match: Option<String>,
    pub modality: ModalityFilter,
    pub min_confidence: Option<f64>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, needle: impl Into<String>) -> Self {
        self.text_match = Some(needle.into());
        self
    }

    pub fn modality(mut self, modality: ModalityFilter) -> Self {
        self.modality = modality;
        self
    }

    pub fn min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = Some(threshold);
        self
    }

    /// The search text, if it constrains anything
    pub fn needle(&self) -> Option<&str> {
        self.text_match.as_deref().filter(|needle| !needle.is_empty())
    }

    pub fn matches(&self, result: &DiagnosticResult) -> bool {
        self.modality.admits(result.modality())
            && self
                .min_confidence
                .map_or(true, |min| result.confidence().value() >= min)
            && self.needle().map_or(true, |needle| result.mentions(needle))
    }

    /// Same predicate over the flat form, for repositories that filter before rehydrating
    pub fn matches_row(&self, row: &RecordRow) -> bool {
        self.modality.admits(row.modality)
            && self.min_confidence.map_or(true, |min| row.confidence_score >= min)
            && self.needle().map_or(true, |needle| {
                let needle = needle.to_lowercase();
                row.diagnosis.to_lowercase().contains(&needle)
                    || row.modality.label().contains(&needle)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::model::fixtures::result_at;
    use chrono::Utc;

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = RecordFilter::new();
        assert!(filter.matches(&result_at("u", Modality::Image, "Rash", 10.0, Utc::now())));
        assert!(filter.matches(&result_at("u", Modality::Voice, "Cough", 99.0, Utc::now())));
    }

    #[test]
    fn test_empty_text_imposes_no_constraint() {
        let filter = RecordFilter::new().text("");
        assert!(filter.matches(&result_at("u", Modality::Image, "Rash", 10.0, Utc::now())));
    }

    #[test]
    fn test_predicates_combine() {
        let filter = RecordFilter::new()
            .modality(ModalityFilter::Voice)
            .min_confidence(80.0);

        assert!(filter.matches(&result_at("u", Modality::Voice, "Migraine", 80.0, Utc::now())));
        assert!(!filter.matches(&result_at("u", Modality::Voice, "Migraine", 79.9, Utc::now())));
        assert!(!filter.matches(&result_at("u", Modality::Image, "Lesion", 95.0, Utc::now())));
    }

    #[test]
    fn test_row_and_result_predicates_agree() {
        let filter = RecordFilter::new().text("LESION");
        let hit = result_at("u", Modality::Image, "Possible skin lesion", 94.2, Utc::now());
        let miss = result_at("u", Modality::Voice, "Migraine", 87.5, Utc::now());

        assert!(filter.matches(&hit));
        assert!(filter.matches_row(&RecordRow::from(&hit)));
        assert!(!filter.matches(&miss));
        assert!(!filter.matches_row(&RecordRow::from(&miss)));
    }

    #[test]
    fn test_filter_deserializes_from_partial_object() {
        let filter: RecordFilter =
            serde_json::from_str(r#"{"modality": "voice", "minConfidence": 80}"#).unwrap();
        assert_eq!(filter.modality, ModalityFilter::Voice);
        assert_eq!(filter.min_confidence, Some(80.0));
        assert_eq!(filter.text_match, None);
    }
}
