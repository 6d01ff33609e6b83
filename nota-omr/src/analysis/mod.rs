//! Score analysis
//!
//! A parsed score is analyzed once into ten independent facets. Each facet
//! is computed in isolation: an internal error becomes an `{"error": ...}`
//! marker for that facet only, never aborting the siblings. The aggregate
//! therefore always carries every facet key, whatever happened.

pub mod chords;
pub mod instruments;
pub mod key;
pub mod notable;
pub mod rhythm;
pub mod structure;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::notation::ScoreDocument;
use crate::text_extraction::TextContent;

/// Error produced inside a single facet computation
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct FacetError(pub String);

impl FacetError {
    pub fn new(msg: impl Into<String>) -> Self {
        FacetError(msg.into())
    }
}

/// One analysis facet: either its computed value or an error marker
///
/// Serializes the error arm as `{"error": "<message>"}` so consumers can
/// distinguish a failed facet from a missing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Facet<T> {
    Value(T),
    Error { error: String },
}

impl<T> Facet<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Facet::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Facet::Value(v) => Some(v),
            Facet::Error { .. } => None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Facet::Error { error: msg.into() }
    }
}

impl<T> From<Result<T, FacetError>> for Facet<T> {
    fn from(result: Result<T, FacetError>) -> Self {
        match result {
            Ok(v) => Facet::Value(v),
            Err(e) => Facet::Error { error: e.0 },
        }
    }
}

/// The complete analysis of one score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub key: Facet<String>,
    pub parts: Facet<Vec<String>>,
    pub chords: Facet<Vec<chords::ChordEvent>>,
    pub time_signature: Facet<String>,
    pub notable_elements: Facet<notable::NotableElements>,
    pub score_structure: Facet<structure::ScoreStructure>,
    pub measures: Facet<rhythm::MeasuresSummary>,
    pub instrumentation: Facet<Vec<instruments::PartInstrument>>,
    pub meter_changes: Facet<rhythm::MeterChanges>,
    pub tempo: Facet<rhythm::TempoSummary>,
    pub text_content: Facet<TextContent>,
}

impl AnalysisResult {
    /// Required for a job to count as fully processed: the core facets
    /// computed without error. Sub-field degradation inside the structural
    /// facets is tolerated.
    pub fn core_facets_ok(&self) -> bool {
        self.key.is_value()
            && self.parts.is_value()
            && self.time_signature.is_value()
            && self.chords.is_value()
    }

    /// Short description of the failed core facets, for error messages
    pub fn core_facet_failures(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.key.is_value() {
            failed.push("key");
        }
        if !self.parts.is_value() {
            failed.push("parts");
        }
        if !self.time_signature.is_value() {
            failed.push("time_signature");
        }
        if !self.chords.is_value() {
            failed.push("chords");
        }
        failed
    }
}

/// Run every facet against one parsed score
pub fn analyze(doc: &ScoreDocument, text_content: Facet<TextContent>) -> AnalysisResult {
    AnalysisResult {
        key: guard("key", key::detect_key(doc)),
        parts: guard("parts", extract_part_names(doc)),
        chords: guard("chords", chords::extract_chords(doc)),
        time_signature: guard("time_signature", rhythm::first_time_signature(doc)),
        notable_elements: guard("notable_elements", notable::tally_notable_elements(doc)),
        score_structure: guard("score_structure", structure::classify_structure(doc)),
        measures: guard("measures", rhythm::summarize_measures(doc)),
        instrumentation: guard("instrumentation", instruments::classify_instrumentation(doc)),
        meter_changes: guard("meter_changes", rhythm::collect_meter_changes(doc)),
        tempo: guard("tempo", rhythm::summarize_tempo(doc)),
        text_content,
    }
}

/// Result for a score whose notation document could not be parsed at all:
/// every facet present, every facet an error marker
pub fn all_facets_error(message: &str, text_content: Facet<TextContent>) -> AnalysisResult {
    AnalysisResult {
        key: Facet::error(message),
        parts: Facet::error(message),
        chords: Facet::error(message),
        time_signature: Facet::error(message),
        notable_elements: Facet::error(message),
        score_structure: Facet::error(message),
        measures: Facet::error(message),
        instrumentation: Facet::error(message),
        meter_changes: Facet::error(message),
        tempo: Facet::error(message),
        text_content,
    }
}

fn guard<T>(facet: &str, result: Result<T, FacetError>) -> Facet<T> {
    if let Err(e) = &result {
        warn!("Facet '{}' failed: {}", facet, e);
    }
    result.into()
}

fn extract_part_names(doc: &ScoreDocument) -> Result<Vec<String>, FacetError> {
    Ok(doc
        .parts
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if p.name.is_empty() {
                format!("Part {}", i + 1)
            } else {
                p.name.clone()
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::Part;

    #[test]
    fn facet_error_serializes_as_marker_object() {
        let facet: Facet<String> = Facet::error("boom");
        let json = serde_json::to_value(&facet).unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }

    #[test]
    fn facet_value_serializes_transparently() {
        let facet: Facet<Vec<String>> = Facet::Value(vec!["Piano".into()]);
        let json = serde_json::to_value(&facet).unwrap();
        assert_eq!(json, serde_json::json!(["Piano"]));
    }

    #[test]
    fn all_facets_error_keeps_every_key() {
        let result = all_facets_error("parse failed", Facet::error("parse failed"));
        let json = serde_json::to_value(&result).unwrap();
        let obj = json.as_object().unwrap();
        for facet in [
            "key",
            "parts",
            "chords",
            "time_signature",
            "notable_elements",
            "score_structure",
            "measures",
            "instrumentation",
            "meter_changes",
            "tempo",
            "text_content",
        ] {
            assert_eq!(
                obj.get(facet).and_then(|v| v.get("error")),
                Some(&serde_json::json!("parse failed")),
                "facet {} missing error marker",
                facet
            );
        }
        assert!(!result.core_facets_ok());
    }

    #[test]
    fn analyze_empty_score_keeps_every_facet_present() {
        let doc = ScoreDocument::default();
        let result = analyze(&doc, Facet::error("no text"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 11);
        // key detection has nothing to work with, but siblings still compute
        assert!(!result.key.is_value());
        assert!(result.parts.is_value());
        assert!(result.chords.is_value());
    }

    #[test]
    fn unnamed_parts_get_positional_names() {
        let doc = ScoreDocument {
            parts: vec![Part::default(), Part::default()],
            ..Default::default()
        };
        let names = extract_part_names(&doc).unwrap();
        assert_eq!(names, vec!["Part 1", "Part 2"]);
    }
}
