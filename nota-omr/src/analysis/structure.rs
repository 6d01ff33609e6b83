//! Score-structure facet
//!
//! Classifies the overall layout (open vs. closed score), the music type
//! (vocal, instrumental, mixed), and the ensemble. Ensemble detection is an
//! ordered fallback chain: part names, then instrument hints, then pitch
//! ranges as the expensive last resort.

use serde::{Deserialize, Serialize};

use crate::notation::{Part, ScoreDocument};

use super::instruments::{self, PartInstrument};
use super::FacetError;

/// SATB tessitura table in MIDI note numbers
const SATB_RANGES: [(&str, u8, u8); 4] = [
    ("Soprano", 60, 84),
    ("Alto", 53, 72),
    ("Tenor", 48, 67),
    ("Bass", 36, 60),
];

/// Slack applied to each end of a tessitura when matching by range
const RANGE_TOLERANCE: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreStructure {
    /// `empty`, `open` (one staff per part), or `closed` (condensed staves)
    pub score_type: String,
    /// `SATB`, `String Quartet`, `Piano Solo`, or `Custom Ensemble`
    pub ensemble_type: String,
    /// `vocal`, `instrumental`, or `mixed`
    pub music_type: String,
    pub instruments: Vec<PartInstrument>,
}

pub fn classify_structure(doc: &ScoreDocument) -> Result<ScoreStructure, FacetError> {
    let mut instruments = instruments::classify_instrumentation(doc)?;
    let ensemble_type = classify_ensemble(doc, &mut instruments);

    Ok(ScoreStructure {
        score_type: classify_score_type(doc),
        ensemble_type,
        music_type: classify_music_type(doc),
        instruments,
    })
}

fn classify_score_type(doc: &ScoreDocument) -> String {
    if doc.parts.is_empty() {
        return "empty".to_string();
    }
    let open = doc.total_staves() >= doc.parts.len() as u32 && !doc.has_brace_group;
    if open { "open" } else { "closed" }.to_string()
}

/// Ordered fallback chain; earlier rules are cheaper and more reliable.
/// A range-based SATB match overwrites generic part labels in the
/// instrument list with the canonical voice names.
fn classify_ensemble(doc: &ScoreDocument, instruments: &mut [PartInstrument]) -> String {
    // 1. Four parts named exactly for the four voices
    if doc.parts.len() == 4 && names_are_satb(&doc.parts) {
        return "SATB".to_string();
    }

    let instrument_names: Vec<String> = doc
        .parts
        .iter()
        .map(|p| {
            p.instrument
                .as_deref()
                .unwrap_or(&p.name)
                .to_lowercase()
        })
        .collect();

    // 2. Piano with at most two parts (grand staff counts as one or two)
    if instrument_names.iter().any(|n| n.contains("piano")) && doc.parts.len() <= 2 {
        return "Piano Solo".to_string();
    }

    // 3. Four parts with a violin present
    if instrument_names.iter().any(|n| n.contains("violin")) && doc.parts.len() == 4 {
        return "String Quartet".to_string();
    }

    // 4. Four parts whose pitch ranges fit the SATB tessituras
    if doc.parts.len() == 4 && ranges_are_satb(&doc.parts) {
        for (slot, (label, _, _)) in instruments.iter_mut().zip(SATB_RANGES.iter()) {
            slot.part = label.to_string();
        }
        return "SATB".to_string();
    }

    "Custom Ensemble".to_string()
}

fn names_are_satb(parts: &[Part]) -> bool {
    let voice_names = ["soprano", "alto", "tenor", "bass"];
    parts.iter().all(|p| {
        let lower = p.name.to_lowercase();
        voice_names.iter().any(|v| lower.contains(v))
    }) && {
        // all four voices represented, not e.g. two sopranos and two altos
        voice_names.iter().all(|v| {
            parts.iter().any(|p| p.name.to_lowercase().contains(v))
        })
    }
}

fn ranges_are_satb(parts: &[Part]) -> bool {
    parts.iter().zip(SATB_RANGES.iter()).all(|(part, (_, lo, hi))| {
        match part.midi_range() {
            Some((part_lo, part_hi)) => {
                part_lo >= lo.saturating_sub(RANGE_TOLERANCE)
                    && part_hi <= hi.saturating_add(RANGE_TOLERANCE)
            }
            None => false,
        }
    })
}

fn classify_music_type(doc: &ScoreDocument) -> String {
    let is_vocal_part = |p: &Part| {
        instruments::is_vocal_role(p.instrument.as_deref().unwrap_or(""))
            || instruments::is_vocal_role(&p.name)
    };

    let any_lyrics = doc.parts.iter().any(|p| p.has_lyrics());
    if !any_lyrics {
        return "instrumental".to_string();
    }

    let all_vocal_roles = !doc.parts.is_empty() && doc.parts.iter().all(|p| is_vocal_part(p));
    if !all_vocal_roles {
        return "mixed".to_string();
    }

    let every_voice_sung = doc.parts.iter().all(|p| p.has_lyrics());
    if every_voice_sung {
        "vocal".to_string()
    } else {
        "instrumental".to_string()
    }
}
