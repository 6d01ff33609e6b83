//! Time, meter, measure, and tempo facets

use serde::{Deserialize, Serialize};

use crate::notation::{Element, ScoreDocument};

use super::FacetError;

/// Reported when the document carries no time signature at all.
/// This is a valid outcome, distinct from a facet error.
pub const NO_TIME_SIGNATURE: &str = "No time signature found";

/// Qualitative tempo words mapped to approximate quarter-note BPM
const TEMPO_WORDS: &[(&str, f64)] = &[
    ("grave", 40.0),
    ("largo", 50.0),
    ("larghetto", 60.0),
    ("adagio", 70.0),
    ("andante", 80.0),
    ("andantino", 94.0),
    ("moderato", 100.0),
    ("allegretto", 112.0),
    ("allegro", 130.0),
    ("vivace", 160.0),
    ("presto", 180.0),
    ("prestissimo", 200.0),
];

/// First time signature in the first part, as `"beats/beat_type"`
pub fn first_time_signature(doc: &ScoreDocument) -> Result<String, FacetError> {
    let found = doc.parts.iter().flat_map(|p| &p.elements).find_map(|e| match e {
        Element::TimeSignature { beats, beat_type, .. } => Some(format!("{}/{}", beats, beat_type)),
        _ => None,
    });

    Ok(found.unwrap_or_else(|| NO_TIME_SIGNATURE.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartMeasures {
    pub part: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasuresSummary {
    /// Measure count of the longest part
    pub total: u32,
    pub per_part: Vec<PartMeasures>,
    /// First measure holds less than a full bar (anacrusis)
    pub has_pickup: bool,
    /// Measures anywhere that fall short of their nominal bar duration
    pub incomplete: u32,
}

pub fn summarize_measures(doc: &ScoreDocument) -> Result<MeasuresSummary, FacetError> {
    let per_part: Vec<PartMeasures> = doc
        .parts
        .iter()
        .enumerate()
        .map(|(i, p)| PartMeasures {
            part: if p.name.is_empty() {
                format!("Part {}", i + 1)
            } else {
                p.name.clone()
            },
            count: p.measures.len() as u32,
        })
        .collect();

    let has_pickup = doc
        .parts
        .first()
        .and_then(|p| p.measures.first())
        .map(|m| m.is_incomplete())
        .unwrap_or(false);

    let incomplete = doc
        .parts
        .iter()
        .flat_map(|p| &p.measures)
        .filter(|m| m.is_incomplete())
        .count() as u32;

    Ok(MeasuresSummary {
        total: per_part.iter().map(|p| p.count).max().unwrap_or(0),
        per_part,
        has_pickup,
        incomplete,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterChange {
    pub from: String,
    pub to: String,
    /// Offset of the new signature in quarter lengths
    pub offset: f64,
    /// Offset ÷ 4, assuming a quarter-note beat unit throughout.
    /// Known simplification: meter changes upstream of this point are
    /// not accounted for.
    pub approx_measure: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterChanges {
    /// Distinct signatures in document order
    pub signatures: Vec<String>,
    pub changes: Vec<MeterChange>,
}

pub fn collect_meter_changes(doc: &ScoreDocument) -> Result<MeterChanges, FacetError> {
    // The first part carries the canonical meter timeline
    let marks: Vec<(String, f64)> = doc
        .parts
        .first()
        .map(|p| {
            p.elements
                .iter()
                .filter_map(|e| match e {
                    Element::TimeSignature { beats, beat_type, offset } => {
                        Some((format!("{}/{}", beats, beat_type), *offset))
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut signatures: Vec<String> = Vec::new();
    let mut changes = Vec::new();
    let mut previous: Option<&str> = None;

    for (signature, offset) in &marks {
        if !signatures.contains(signature) {
            signatures.push(signature.clone());
        }
        if let Some(prev) = previous {
            if prev != signature {
                changes.push(MeterChange {
                    from: prev.to_string(),
                    to: signature.clone(),
                    offset: *offset,
                    approx_measure: (offset / 4.0).floor() as u32 + 1,
                });
            }
        }
        previous = Some(signature);
    }

    Ok(MeterChanges { signatures, changes })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMarking {
    /// Descriptive text ("Allegro"), when present
    pub text: Option<String>,
    /// Quarter-note BPM, explicit or inferred from the text
    pub bpm: Option<f64>,
    pub offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoChange {
    pub from_bpm: f64,
    pub to_bpm: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoSummary {
    pub markings: Vec<TempoMarking>,
    pub changes: Vec<TempoChange>,
    /// Unweighted mean over all markings with a known BPM
    pub average_bpm: Option<f64>,
}

pub fn summarize_tempo(doc: &ScoreDocument) -> Result<TempoSummary, FacetError> {
    let mut markings: Vec<TempoMarking> = doc
        .parts
        .iter()
        .flat_map(|p| &p.elements)
        .filter_map(|e| match e {
            Element::Tempo { text, bpm, offset } => {
                let bpm = bpm.or_else(|| text.as_deref().and_then(word_bpm));
                // Directions with neither a mark nor a recognized word are
                // not tempo indications
                if bpm.is_none() && text.is_none() {
                    return None;
                }
                Some(TempoMarking {
                    text: text.clone(),
                    bpm,
                    offset: *offset,
                })
            }
            _ => None,
        })
        .collect();

    markings.sort_by(|a, b| a.offset.partial_cmp(&b.offset).unwrap_or(std::cmp::Ordering::Equal));

    let with_bpm: Vec<(f64, f64)> = markings
        .iter()
        .filter_map(|m| m.bpm.map(|b| (b, m.offset)))
        .collect();

    let changes = with_bpm
        .windows(2)
        .filter(|w| (w[0].0 - w[1].0).abs() > f64::EPSILON)
        .map(|w| TempoChange {
            from_bpm: w[0].0,
            to_bpm: w[1].0,
            offset: w[1].1,
        })
        .collect();

    let average_bpm = if with_bpm.is_empty() {
        None
    } else {
        Some(with_bpm.iter().map(|(b, _)| b).sum::<f64>() / with_bpm.len() as f64)
    };

    Ok(TempoSummary {
        markings,
        changes,
        average_bpm,
    })
}

/// BPM for a qualitative tempo word, matched case-insensitively anywhere
/// in the direction text
fn word_bpm(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    // Longest keyword wins so "allegretto" does not match "allegro"
    TEMPO_WORDS
        .iter()
        .filter(|(word, _)| lower.contains(word))
        .max_by_key(|(word, _)| word.len())
        .map(|(_, bpm)| *bpm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{MeasureInfo, Part};

    fn part_with(elements: Vec<Element>) -> ScoreDocument {
        ScoreDocument {
            parts: vec![Part { elements, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn reports_first_time_signature() {
        let doc = part_with(vec![
            Element::TimeSignature { beats: 6, beat_type: 8, offset: 0.0 },
            Element::TimeSignature { beats: 4, beat_type: 4, offset: 12.0 },
        ]);
        assert_eq!(first_time_signature(&doc).unwrap(), "6/8");
    }

    #[test]
    fn missing_time_signature_is_a_sentinel_not_an_error() {
        let doc = part_with(vec![]);
        assert_eq!(first_time_signature(&doc).unwrap(), NO_TIME_SIGNATURE);
    }

    #[test]
    fn meter_changes_record_transitions_only() {
        let doc = part_with(vec![
            Element::TimeSignature { beats: 4, beat_type: 4, offset: 0.0 },
            Element::TimeSignature { beats: 4, beat_type: 4, offset: 16.0 },
            Element::TimeSignature { beats: 3, beat_type: 4, offset: 32.0 },
        ]);
        let result = collect_meter_changes(&doc).unwrap();
        assert_eq!(result.signatures, vec!["4/4", "3/4"]);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].from, "4/4");
        assert_eq!(result.changes[0].to, "3/4");
        assert_eq!(result.changes[0].approx_measure, 9);
    }

    #[test]
    fn tempo_words_map_to_bpm() {
        assert_eq!(word_bpm("Allegro con brio"), Some(130.0));
        assert_eq!(word_bpm("Allegretto"), Some(112.0));
        assert_eq!(word_bpm("dolce"), None);
    }

    #[test]
    fn tempo_summary_averages_and_flags_changes() {
        let doc = part_with(vec![
            Element::Tempo { text: Some("Allegro".into()), bpm: None, offset: 0.0 },
            Element::Tempo { text: None, bpm: Some(90.0), offset: 16.0 },
        ]);
        let summary = summarize_tempo(&doc).unwrap();
        assert_eq!(summary.markings.len(), 2);
        assert_eq!(summary.changes.len(), 1);
        assert_eq!(summary.changes[0].from_bpm, 130.0);
        assert_eq!(summary.changes[0].to_bpm, 90.0);
        assert_eq!(summary.average_bpm, Some(110.0));
    }

    #[test]
    fn pickup_and_incomplete_measures_are_counted() {
        let doc = ScoreDocument {
            parts: vec![Part {
                name: "Melody".into(),
                measures: vec![
                    MeasureInfo { number: 1, nominal_duration: 4.0, actual_duration: 1.0 },
                    MeasureInfo { number: 2, nominal_duration: 4.0, actual_duration: 4.0 },
                    MeasureInfo { number: 3, nominal_duration: 4.0, actual_duration: 3.0 },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        let summary = summarize_measures(&doc).unwrap();
        assert_eq!(summary.total, 3);
        assert!(summary.has_pickup);
        assert_eq!(summary.incomplete, 2);
        assert_eq!(summary.per_part[0].part, "Melody");
    }
}
