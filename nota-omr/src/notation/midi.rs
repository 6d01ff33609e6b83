//! Standard MIDI File rendering of a parsed score
//!
//! Writes a minimal format-1 SMF: one conductor track carrying tempo and
//! time-signature meta events, then one track per part with note on/off
//! pairs. Chords become simultaneous notes; rests become gaps.

use super::{Element, Part, ScoreDocument};

const TICKS_PER_QUARTER: u32 = 480;
const DEFAULT_VELOCITY: u8 = 72;

/// Render a score as a format-1 Standard MIDI File byte stream
pub fn render_midi(doc: &ScoreDocument) -> Vec<u8> {
    let mut out = Vec::new();

    let track_count = 1 + doc.parts.len() as u16;

    // Header chunk
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&track_count.to_be_bytes());
    out.extend_from_slice(&(TICKS_PER_QUARTER as u16).to_be_bytes());

    write_track(&mut out, &conductor_track(doc));

    for (i, part) in doc.parts.iter().enumerate() {
        // Channel 9 is reserved for percussion in General MIDI; skip it
        let channel = {
            let c = (i % 15) as u8;
            if c >= 9 { c + 1 } else { c }
        };
        write_track(&mut out, &part_track(part, channel));
    }

    out
}

fn ticks(quarters: f64) -> u32 {
    (quarters * TICKS_PER_QUARTER as f64).round().max(0.0) as u32
}

/// (absolute tick, event bytes) pairs, later delta-encoded
type TimedEvent = (u32, Vec<u8>);

fn conductor_track(doc: &ScoreDocument) -> Vec<TimedEvent> {
    let mut events: Vec<TimedEvent> = Vec::new();

    for part in &doc.parts {
        for element in &part.elements {
            match element {
                Element::TimeSignature { beats, beat_type, offset } => {
                    // denominator is stored as a power of two
                    let denom_pow = (*beat_type as f64).log2().round() as u8;
                    events.push((
                        ticks(*offset),
                        vec![0xFF, 0x58, 0x04, *beats as u8, denom_pow, 24, 8],
                    ));
                }
                Element::Tempo { bpm: Some(bpm), offset, .. } if *bpm > 0.0 => {
                    let usec_per_quarter = (60_000_000.0 / bpm).round() as u32;
                    let b = usec_per_quarter.to_be_bytes();
                    events.push((ticks(*offset), vec![0xFF, 0x51, 0x03, b[1], b[2], b[3]]));
                }
                _ => {}
            }
        }
        // Meta events from the first part only; duplicates from aligned
        // parts would be redundant
        if !events.is_empty() {
            break;
        }
    }

    // Fallback tempo when the score states none (120 BPM)
    if !events.iter().any(|(_, e)| e.get(1) == Some(&0x51)) {
        let b = 500_000u32.to_be_bytes();
        events.push((0, vec![0xFF, 0x51, 0x03, b[1], b[2], b[3]]));
    }

    events.sort_by_key(|(t, _)| *t);
    events
}

fn part_track(part: &Part, channel: u8) -> Vec<TimedEvent> {
    let mut events: Vec<TimedEvent> = Vec::new();

    let mut push_note = |pitch: u8, offset: f64, duration: f64| {
        let on = ticks(offset);
        let off = on + ticks(duration).max(1);
        events.push((on, vec![0x90 | channel, pitch, DEFAULT_VELOCITY]));
        events.push((off, vec![0x80 | channel, pitch, 0]));
    };

    for element in &part.elements {
        match element {
            Element::Note { pitch, offset, duration, .. } => {
                push_note(pitch.midi(), *offset, *duration);
            }
            Element::Chord { pitches, offset, duration } => {
                for p in pitches {
                    push_note(p.midi(), *offset, *duration);
                }
            }
            _ => {}
        }
    }

    // Note-off before note-on at the same tick avoids stuck notes on retrigger
    events.sort_by_key(|(t, e)| (*t, e[0] & 0xF0 != 0x80));
    events
}

fn write_track(out: &mut Vec<u8>, events: &[TimedEvent]) {
    let mut body = Vec::new();
    let mut last_tick = 0u32;

    for (tick, bytes) in events {
        write_varlen(&mut body, tick - last_tick);
        body.extend_from_slice(bytes);
        last_tick = *tick;
    }

    // End of track
    write_varlen(&mut body, 0);
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
}

/// MIDI variable-length quantity encoding
fn write_varlen(out: &mut Vec<u8>, mut value: u32) {
    let mut buffer = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        buffer.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    buffer.reverse();
    out.extend_from_slice(&buffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::Pitch;

    fn one_note_doc() -> ScoreDocument {
        ScoreDocument {
            work_title: None,
            has_brace_group: false,
            parts: vec![Part {
                id: "P1".into(),
                name: "Flute".into(),
                instrument: None,
                staves: 1,
                measures: vec![],
                elements: vec![Element::Note {
                    pitch: Pitch { step: 'A', alter: 0, octave: 4 },
                    offset: 0.0,
                    duration: 1.0,
                    accidental: None,
                    articulations: vec![],
                    lyric: None,
                }],
            }],
        }
    }

    #[test]
    fn header_declares_format_1_and_track_count() {
        let bytes = render_midi(&one_note_doc());
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 1);
        // conductor + one part
        assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 2);
        assert_eq!(
            u16::from_be_bytes([bytes[12], bytes[13]]),
            TICKS_PER_QUARTER as u16
        );
    }

    #[test]
    fn note_track_contains_on_off_pair() {
        let bytes = render_midi(&one_note_doc());
        // A4 = MIDI 69
        let has_on = bytes.windows(3).any(|w| w == [0x90, 69, DEFAULT_VELOCITY]);
        let has_off = bytes.windows(3).any(|w| w == [0x80, 69, 0]);
        assert!(has_on);
        assert!(has_off);
    }

    #[test]
    fn varlen_encoding_matches_known_values() {
        let mut buf = Vec::new();
        write_varlen(&mut buf, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        write_varlen(&mut buf, 127);
        assert_eq!(buf, vec![0x7F]);

        buf.clear();
        write_varlen(&mut buf, 128);
        assert_eq!(buf, vec![0x81, 0x00]);

        buf.clear();
        write_varlen(&mut buf, 480);
        assert_eq!(buf, vec![0x83, 0x60]);
    }

    #[test]
    fn empty_score_still_renders_a_conductor_track() {
        let doc = ScoreDocument::default();
        let bytes = render_midi(&doc);
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 1);
        assert_eq!(&bytes[14..18], b"MTrk");
    }
}
