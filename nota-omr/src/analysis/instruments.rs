//! Instrumentation facet
//!
//! Per-part instrument family classification via a fixed keyword table.
//! The instrument name from the part list wins; the part name is the
//! fallback when no explicit instrument metadata exists.

use serde::{Deserialize, Serialize};

use crate::notation::ScoreDocument;

use super::FacetError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInstrument {
    pub part: String,
    pub instrument: String,
    pub family: String,
}

/// Keyword table, checked in order: specific names before generic ones
/// ("double bass" must hit strings before "bass" hits vocal)
const FAMILY_KEYWORDS: &[(&str, &str)] = &[
    ("double bass", "strings"),
    ("bass guitar", "strings"),
    ("bass drum", "percussion"),
    ("bass clarinet", "woodwinds"),
    ("bass trombone", "brass"),
    ("english horn", "woodwinds"),
    ("french horn", "brass"),
    ("piano", "keyboard"),
    ("organ", "keyboard"),
    ("harpsichord", "keyboard"),
    ("celesta", "keyboard"),
    ("keyboard", "keyboard"),
    ("violin", "strings"),
    ("viola", "strings"),
    ("cello", "strings"),
    ("violoncello", "strings"),
    ("contrabass", "strings"),
    ("harp", "strings"),
    ("guitar", "strings"),
    ("flute", "woodwinds"),
    ("piccolo", "woodwinds"),
    ("oboe", "woodwinds"),
    ("clarinet", "woodwinds"),
    ("bassoon", "woodwinds"),
    ("saxophone", "woodwinds"),
    ("recorder", "woodwinds"),
    ("trumpet", "brass"),
    ("trombone", "brass"),
    ("horn", "brass"),
    ("tuba", "brass"),
    ("cornet", "brass"),
    ("euphonium", "brass"),
    ("timpani", "percussion"),
    ("drum", "percussion"),
    ("cymbal", "percussion"),
    ("percussion", "percussion"),
    ("marimba", "percussion"),
    ("xylophone", "percussion"),
    ("vibraphone", "percussion"),
    ("glockenspiel", "percussion"),
    ("soprano", "vocal"),
    ("mezzo", "vocal"),
    ("alto", "vocal"),
    ("tenor", "vocal"),
    ("baritone", "vocal"),
    ("bass", "vocal"),
    ("voice", "vocal"),
    ("vocal", "vocal"),
    ("choir", "vocal"),
    ("chorus", "vocal"),
];

/// Classify an instrument or part name into a family, when recognized
pub fn family_for(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    FAMILY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, family)| *family)
}

/// True when the name denotes a singing role
pub fn is_vocal_role(name: &str) -> bool {
    family_for(name) == Some("vocal")
}

pub fn classify_instrumentation(doc: &ScoreDocument) -> Result<Vec<PartInstrument>, FacetError> {
    let classified = doc
        .parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let part_name = if part.name.is_empty() {
                format!("Part {}", i + 1)
            } else {
                part.name.clone()
            };
            let instrument = part.instrument.clone().unwrap_or_else(|| part_name.clone());
            let family = family_for(&instrument)
                .or_else(|| family_for(&part_name))
                .unwrap_or("unknown")
                .to_string();
            PartInstrument {
                part: part_name,
                instrument,
                family,
            }
        })
        .collect();

    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::Part;

    #[test]
    fn specific_keywords_beat_generic_ones() {
        assert_eq!(family_for("Double Bass"), Some("strings"));
        assert_eq!(family_for("Bass"), Some("vocal"));
        assert_eq!(family_for("Bass Clarinet"), Some("woodwinds"));
        assert_eq!(family_for("French Horn"), Some("brass"));
    }

    #[test]
    fn common_instruments_classify() {
        assert_eq!(family_for("Grand Piano"), Some("keyboard"));
        assert_eq!(family_for("Violin II"), Some("strings"));
        assert_eq!(family_for("Flute"), Some("woodwinds"));
        assert_eq!(family_for("Timpani"), Some("percussion"));
        assert_eq!(family_for("Soprano"), Some("vocal"));
        assert_eq!(family_for("Theremin"), None);
    }

    #[test]
    fn part_name_is_the_fallback() {
        let doc = ScoreDocument {
            parts: vec![Part {
                name: "Cello".into(),
                instrument: None,
                ..Default::default()
            }],
            ..Default::default()
        };
        let classified = classify_instrumentation(&doc).unwrap();
        assert_eq!(classified[0].family, "strings");
        assert_eq!(classified[0].instrument, "Cello");
    }

    #[test]
    fn unknown_names_get_unknown_family() {
        let doc = ScoreDocument {
            parts: vec![Part {
                name: "Kazoo Ensemble".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let classified = classify_instrumentation(&doc).unwrap();
        assert_eq!(classified[0].family, "unknown");
    }
}
