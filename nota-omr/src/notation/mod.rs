//! In-memory notation model
//!
//! A parsed score is a list of parts, each holding a flat, offset-ordered
//! element list. Offsets and durations are in quarter-note lengths, already
//! normalized from the source file's `divisions` unit.

pub mod midi;
pub mod parser;

pub use parser::{parse_musicxml, ParseError};

/// A spelled pitch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pitch {
    /// Diatonic step, `'A'..='G'`
    pub step: char,
    /// Chromatic alteration in semitones (-2..=2)
    pub alter: i8,
    /// Scientific pitch notation octave (C4 = middle C)
    pub octave: i8,
}

impl Pitch {
    /// MIDI note number (C4 = 60), clamped to 0..=127
    pub fn midi(&self) -> u8 {
        let base = match self.step {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11, // B
        };
        let value = (self.octave as i32 + 1) * 12 + base + self.alter as i32;
        value.clamp(0, 127) as u8
    }

    /// Pitch class 0..=11 (C = 0)
    pub fn pitch_class(&self) -> u8 {
        self.midi() % 12
    }

    /// Name with accidental and octave, e.g. `C#4` or `Bb3`
    pub fn name(&self) -> String {
        let accidental = match self.alter {
            -2 => "bb",
            -1 => "b",
            1 => "#",
            2 => "##",
            _ => "",
        };
        format!("{}{}{}", self.step, accidental, self.octave)
    }
}

/// One timed element within a part
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Note {
        pitch: Pitch,
        offset: f64,
        duration: f64,
        accidental: Option<String>,
        articulations: Vec<String>,
        lyric: Option<String>,
    },
    Chord {
        pitches: Vec<Pitch>,
        offset: f64,
        duration: f64,
    },
    Rest {
        offset: f64,
        duration: f64,
    },
    Dynamic {
        marking: String,
        offset: f64,
    },
    TimeSignature {
        beats: u32,
        beat_type: u32,
        offset: f64,
    },
    Tempo {
        text: Option<String>,
        bpm: Option<f64>,
        offset: f64,
    },
}

impl Element {
    pub fn offset(&self) -> f64 {
        match self {
            Element::Note { offset, .. }
            | Element::Chord { offset, .. }
            | Element::Rest { offset, .. }
            | Element::Dynamic { offset, .. }
            | Element::TimeSignature { offset, .. }
            | Element::Tempo { offset, .. } => *offset,
        }
    }
}

/// Duration bookkeeping for one measure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureInfo {
    /// 1-based position within the part
    pub number: u32,
    /// Bar duration implied by the governing time signature, in quarters
    pub nominal_duration: f64,
    /// Widest cursor excursion actually written into the measure, in quarters
    pub actual_duration: f64,
}

impl MeasureInfo {
    /// True when the measure holds less music than its time signature implies
    pub fn is_incomplete(&self) -> bool {
        self.actual_duration + 1e-6 < self.nominal_duration
    }
}

/// One part (instrument line) of a score
#[derive(Debug, Clone, Default)]
pub struct Part {
    pub id: String,
    pub name: String,
    /// Instrument name from the part list, when present
    pub instrument: Option<String>,
    /// Staff count declared in the part's attributes (1 unless stated)
    pub staves: u32,
    pub elements: Vec<Element>,
    pub measures: Vec<MeasureInfo>,
}

impl Part {
    /// All sounding pitches in the part, in element order
    pub fn pitches(&self) -> impl Iterator<Item = &Pitch> {
        self.elements.iter().flat_map(|e| match e {
            Element::Note { pitch, .. } => std::slice::from_ref(pitch).iter(),
            Element::Chord { pitches, .. } => pitches.iter(),
            _ => [].iter(),
        })
    }

    /// True if any note in the part carries lyric text
    pub fn has_lyrics(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, Element::Note { lyric: Some(_), .. }))
    }

    /// Lowest and highest MIDI note sounded, if the part has any pitches
    pub fn midi_range(&self) -> Option<(u8, u8)> {
        let mut range: Option<(u8, u8)> = None;
        for p in self.pitches() {
            let m = p.midi();
            range = Some(match range {
                Some((lo, hi)) => (lo.min(m), hi.max(m)),
                None => (m, m),
            });
        }
        range
    }
}

/// A complete parsed score
#[derive(Debug, Clone, Default)]
pub struct ScoreDocument {
    pub work_title: Option<String>,
    pub parts: Vec<Part>,
    /// True when the part list declares a brace group (keyboard-style bracket)
    pub has_brace_group: bool,
}

impl ScoreDocument {
    pub fn total_staves(&self) -> u32 {
        self.parts.iter().map(|p| p.staves).sum()
    }
}
