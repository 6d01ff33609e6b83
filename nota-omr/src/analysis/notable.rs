//! Notable-elements facet
//!
//! One traversal over all notes tallies accidentals and articulations by
//! kind; a second collects the distinct dynamics markings. The chart block
//! is presentation data derived from the tallies, nothing more.

use serde::{Deserialize, Serialize};

use crate::notation::{Element, ScoreDocument};

use super::FacetError;

/// Fixed category colors for the derived chart
const CHART_COLORS: [&str; 3] = ["#FF6384", "#36A2EB", "#FFCE56"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccidentalCounts {
    pub sharp: u64,
    pub flat: u64,
    pub natural: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticulationCounts {
    pub staccato: u64,
    pub accent: u64,
    pub tenuto: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub counts: Vec<u64>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotableElements {
    pub accidentals: AccidentalCounts,
    pub articulations: ArticulationCounts,
    /// Distinct dynamic markings, sorted lexicographically
    pub dynamics: Vec<String>,
    pub chart: ChartData,
}

pub fn tally_notable_elements(doc: &ScoreDocument) -> Result<NotableElements, FacetError> {
    let mut accidentals = AccidentalCounts::default();
    let mut articulations = ArticulationCounts::default();

    for part in &doc.parts {
        for element in &part.elements {
            let Element::Note {
                accidental,
                articulations: note_articulations,
                ..
            } = element
            else {
                continue;
            };

            if let Some(kind) = accidental {
                match kind.as_str() {
                    "sharp" | "double-sharp" => accidentals.sharp += 1,
                    "flat" | "flat-flat" => accidentals.flat += 1,
                    "natural" => accidentals.natural += 1,
                    _ => accidentals.other += 1,
                }
            }

            for articulation in note_articulations {
                match articulation.as_str() {
                    "staccato" | "staccatissimo" => articulations.staccato += 1,
                    "accent" | "strong-accent" => articulations.accent += 1,
                    "tenuto" => articulations.tenuto += 1,
                    _ => {}
                }
            }
        }
    }

    // Dynamics are rarer; a second pass keeps the note loop simple
    let mut dynamics: Vec<String> = doc
        .parts
        .iter()
        .flat_map(|p| &p.elements)
        .filter_map(|e| match e {
            Element::Dynamic { marking, .. } => Some(marking.clone()),
            _ => None,
        })
        .collect();
    dynamics.sort();
    dynamics.dedup();

    let accidental_total = accidentals.sharp + accidentals.flat + accidentals.natural + accidentals.other;
    let articulation_total = articulations.staccato + articulations.accent + articulations.tenuto;

    let chart = ChartData {
        labels: vec![
            "Accidentals".to_string(),
            "Articulations".to_string(),
            "Dynamics".to_string(),
        ],
        counts: vec![accidental_total, articulation_total, dynamics.len() as u64],
        colors: CHART_COLORS.iter().map(|c| c.to_string()).collect(),
    };

    Ok(NotableElements {
        accidentals,
        articulations,
        dynamics,
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{Part, Pitch};

    fn note(accidental: Option<&str>, articulations: &[&str]) -> Element {
        Element::Note {
            pitch: Pitch { step: 'C', alter: 0, octave: 4 },
            offset: 0.0,
            duration: 1.0,
            accidental: accidental.map(String::from),
            articulations: articulations.iter().map(|s| s.to_string()).collect(),
            lyric: None,
        }
    }

    #[test]
    fn tallies_accidentals_by_kind() {
        let doc = ScoreDocument {
            parts: vec![Part {
                elements: vec![
                    note(Some("sharp"), &[]),
                    note(Some("sharp"), &[]),
                    note(Some("flat"), &[]),
                    note(Some("natural"), &[]),
                    note(Some("quarter-sharp"), &[]),
                    note(None, &[]),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let result = tally_notable_elements(&doc).unwrap();
        assert_eq!(result.accidentals.sharp, 2);
        assert_eq!(result.accidentals.flat, 1);
        assert_eq!(result.accidentals.natural, 1);
        assert_eq!(result.accidentals.other, 1);
    }

    #[test]
    fn dynamics_are_distinct_and_sorted() {
        let doc = ScoreDocument {
            parts: vec![Part {
                elements: vec![
                    Element::Dynamic { marking: "mf".into(), offset: 0.0 },
                    Element::Dynamic { marking: "f".into(), offset: 4.0 },
                    Element::Dynamic { marking: "mf".into(), offset: 8.0 },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let result = tally_notable_elements(&doc).unwrap();
        assert_eq!(result.dynamics, vec!["f", "mf"]);
    }

    #[test]
    fn chart_block_mirrors_the_tallies() {
        let doc = ScoreDocument {
            parts: vec![Part {
                elements: vec![
                    note(Some("sharp"), &["staccato", "accent"]),
                    Element::Dynamic { marking: "p".into(), offset: 0.0 },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let result = tally_notable_elements(&doc).unwrap();
        assert_eq!(result.chart.counts, vec![1, 2, 1]);
        assert_eq!(result.chart.colors.len(), 3);
        assert_eq!(result.chart.colors[0], "#FF6384");
    }
}
