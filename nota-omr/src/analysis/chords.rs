//! Chord extraction
//!
//! Harmonic reduction per part: notes sounding at the same onset collapse
//! into one chord event. Collection stops at 10 chords across all parts
//! combined, in part order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::notation::{Element, Pitch, ScoreDocument};

use super::FacetError;

/// Total chords collected across all parts
const CHORD_CAP: usize = 10;

/// One detected chord with a human-readable description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordEvent {
    pub description: String,
    /// Onset in quarter lengths from the start of the part
    pub offset: f64,
}

/// Extract up to [`CHORD_CAP`] chords from the whole score
pub fn extract_chords(doc: &ScoreDocument) -> Result<Vec<ChordEvent>, FacetError> {
    let mut events = Vec::new();

    'parts: for part in &doc.parts {
        // Group sounding pitches by onset; elements are offset-sorted
        let mut current: Option<(f64, Vec<Pitch>)> = None;

        let flush = |group: Option<(f64, Vec<Pitch>)>, events: &mut Vec<ChordEvent>| {
            if let Some((offset, pitches)) = group {
                if pitches.len() >= 2 {
                    events.push(ChordEvent {
                        description: describe_chord(&pitches),
                        offset,
                    });
                }
            }
        };

        for element in &part.elements {
            let (offset, pitches): (f64, Vec<Pitch>) = match element {
                Element::Note { pitch, offset, .. } => (*offset, vec![*pitch]),
                Element::Chord { pitches, offset, .. } => (*offset, pitches.clone()),
                _ => continue,
            };

            match &mut current {
                Some((group_offset, group)) if (*group_offset - offset).abs() < 1e-6 => {
                    group.extend(pitches);
                }
                _ => {
                    flush(current.take(), &mut events);
                    if events.len() >= CHORD_CAP {
                        break 'parts;
                    }
                    current = Some((offset, pitches));
                }
            }
        }
        flush(current, &mut events);
        if events.len() >= CHORD_CAP {
            break;
        }
    }

    events.truncate(CHORD_CAP);
    Ok(events)
}

/// Name a chord from its pitch content, e.g. `"C major triad"`.
/// Unrecognized collections fall back to listing the pitches.
pub fn describe_chord(pitches: &[Pitch]) -> String {
    let classes: BTreeSet<u8> = pitches.iter().map(|p| p.pitch_class()).collect();

    // Try every member as root and match the resulting interval set
    for root in &classes {
        let intervals: BTreeSet<u8> = classes.iter().map(|c| (12 + c - root) % 12).collect();
        if let Some(quality) = quality_name(&intervals) {
            let root_name = pitches
                .iter()
                .find(|p| p.pitch_class() == *root)
                .map(|p| {
                    let name = p.name();
                    name[..name.len() - 1].to_string() // strip octave digit
                })
                .unwrap_or_default();
            return format!("{} {}", root_name, quality);
        }
    }

    let mut names: Vec<String> = pitches.iter().map(|p| p.name()).collect();
    names.sort();
    names.dedup();
    names.join("+")
}

fn quality_name(intervals: &BTreeSet<u8>) -> Option<&'static str> {
    let set: Vec<u8> = intervals.iter().copied().collect();
    match set.as_slice() {
        [0, 4, 7] => Some("major triad"),
        [0, 3, 7] => Some("minor triad"),
        [0, 3, 6] => Some("diminished triad"),
        [0, 4, 8] => Some("augmented triad"),
        [0, 4, 7, 10] => Some("dominant seventh chord"),
        [0, 4, 7, 11] => Some("major seventh chord"),
        [0, 3, 7, 10] => Some("minor seventh chord"),
        [0, 3, 6, 10] => Some("half-diminished seventh chord"),
        [0, 3, 6, 9] => Some("diminished seventh chord"),
        [0, 7] => Some("open fifth"),
        _ => None,
    }
}
