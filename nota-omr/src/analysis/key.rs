//! Key detection
//!
//! Krumhansl-Schmuckler profile matching: correlate the score's
//! duration-weighted pitch-class histogram against the 24 rotated
//! major/minor key profiles and report the best match.

use crate::notation::{Element, ScoreDocument};

use super::FacetError;

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Detect the most likely key of the whole score, e.g. `"G major"`
pub fn detect_key(doc: &ScoreDocument) -> Result<String, FacetError> {
    let histogram = pitch_class_histogram(doc);

    if histogram.iter().sum::<f64>() <= 0.0 {
        return Err(FacetError::new("no pitched content to derive a key from"));
    }

    let mut best: Option<(f64, usize, bool)> = None;

    for tonic in 0..12 {
        for (profile, is_major) in [(&MAJOR_PROFILE, true), (&MINOR_PROFILE, false)] {
            let rotated: Vec<f64> = (0..12).map(|i| histogram[(i + tonic) % 12]).collect();
            let r = correlation(&rotated, profile);
            if best.map_or(true, |(score, _, _)| r > score) {
                best = Some((r, tonic, is_major));
            }
        }
    }

    let (_, tonic, is_major) = best.expect("24 candidates were scored");
    let mode = if is_major { "major" } else { "minor" };
    Ok(format!("{} {}", PITCH_NAMES[tonic], mode))
}

/// Duration-weighted pitch-class counts across all parts
fn pitch_class_histogram(doc: &ScoreDocument) -> [f64; 12] {
    let mut histogram = [0.0f64; 12];

    for part in &doc.parts {
        for element in &part.elements {
            match element {
                Element::Note { pitch, duration, .. } => {
                    histogram[pitch.pitch_class() as usize] += duration.max(0.25);
                }
                Element::Chord { pitches, duration, .. } => {
                    for p in pitches {
                        histogram[p.pitch_class() as usize] += duration.max(0.25);
                    }
                }
                _ => {}
            }
        }
    }

    histogram
}

fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    cov / (var_x * var_y).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{Part, Pitch};

    fn doc_from_pitches(pitches: &[(char, i8)]) -> ScoreDocument {
        let elements = pitches
            .iter()
            .enumerate()
            .map(|(i, &(step, alter))| Element::Note {
                pitch: Pitch { step, alter, octave: 4 },
                offset: i as f64,
                duration: 1.0,
                accidental: None,
                articulations: vec![],
                lyric: None,
            })
            .collect();
        ScoreDocument {
            parts: vec![Part { elements, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn c_major_scale_detects_c_major() {
        let doc = doc_from_pitches(&[
            ('C', 0), ('D', 0), ('E', 0), ('F', 0), ('G', 0), ('A', 0), ('B', 0), ('C', 0),
            // weight the tonic and dominant like real tonal music does
            ('C', 0), ('G', 0), ('C', 0), ('E', 0), ('G', 0),
        ]);
        assert_eq!(detect_key(&doc).unwrap(), "C major");
    }

    #[test]
    fn a_minor_material_detects_a_minor() {
        let doc = doc_from_pitches(&[
            ('A', 0), ('B', 0), ('C', 0), ('D', 0), ('E', 0), ('F', 0), ('G', 1), ('A', 0),
            ('A', 0), ('E', 0), ('A', 0), ('C', 0), ('E', 0),
        ]);
        assert_eq!(detect_key(&doc).unwrap(), "A minor");
    }

    #[test]
    fn empty_score_is_a_facet_error() {
        let doc = ScoreDocument::default();
        assert!(detect_key(&doc).is_err());
    }
}
