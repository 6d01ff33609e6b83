//! MusicXML (partwise) parser
//!
//! Event-driven reader over the uncompressed `.xml` document. Only the
//! elements the analysis facets consume are modeled; everything else is
//! skipped structurally so unknown markup never derails a parse.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;

use super::{Element, MeasureInfo, Part, Pitch, ScoreDocument};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed MusicXML: {0}")]
    Malformed(String),
}

/// Parse a partwise MusicXML document into a [`ScoreDocument`]
pub fn parse_musicxml(xml: &str) -> Result<ScoreDocument, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = ScoreDocument::default();
    // Part metadata from <part-list>, keyed by part id
    let mut part_meta: HashMap<String, (String, Option<String>)> = HashMap::new();
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"score-partwise" => saw_root = true,
                b"work-title" | b"movement-title" => {
                    let title = read_text(&mut reader, e.name().as_ref())?;
                    if doc.work_title.is_none() && !title.is_empty() {
                        doc.work_title = Some(title);
                    }
                }
                b"part-list" => {
                    parse_part_list(&mut reader, &mut part_meta, &mut doc.has_brace_group)?;
                }
                b"part" => {
                    let id = attr_value(&e, b"id").unwrap_or_default();
                    let mut part = parse_part(&mut reader)?;
                    part.id = id.clone();
                    if let Some((name, instrument)) = part_meta.get(&id) {
                        part.name = name.clone();
                        part.instrument = instrument.clone();
                    }
                    doc.parts.push(part);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::Malformed("no <score-partwise> root element".into()));
    }

    Ok(doc)
}

/// Parse `<part-list>`: part names, instrument names, and brace groups
fn parse_part_list(
    reader: &mut Reader<&[u8]>,
    part_meta: &mut HashMap<String, (String, Option<String>)>,
    has_brace_group: &mut bool,
) -> Result<(), ParseError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"score-part" => {
                    let id = attr_value(&e, b"id").unwrap_or_default();
                    let (name, instrument) = parse_score_part(reader)?;
                    part_meta.insert(id, (name, instrument));
                }
                b"part-group" => {
                    if parse_part_group_is_brace(reader)? {
                        *has_brace_group = true;
                    }
                }
                other => {
                    let name = other.to_vec();
                    skip_element(reader, &name)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"part-list" => break,
            Event::Eof => {
                return Err(ParseError::Malformed("unterminated <part-list>".into()));
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_score_part(reader: &mut Reader<&[u8]>) -> Result<(String, Option<String>), ParseError> {
    let mut name = String::new();
    let mut instrument = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"part-name" => name = read_text(reader, b"part-name")?,
                b"instrument-name" => {
                    let text = read_text(reader, b"instrument-name")?;
                    if !text.is_empty() {
                        instrument = Some(text);
                    }
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"score-part" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <score-part>".into())),
            _ => {}
        }
    }

    Ok((name, instrument))
}

fn parse_part_group_is_brace(reader: &mut Reader<&[u8]>) -> Result<bool, ParseError> {
    let mut is_brace = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.name().as_ref() == b"group-symbol" {
                    let symbol = read_text(reader, b"group-symbol")?;
                    if symbol == "brace" {
                        is_brace = true;
                    }
                } else {
                    let tag = e.name().as_ref().to_vec();
                    skip_element(reader, &tag)?;
                }
            }
            Event::End(e) if e.name().as_ref() == b"part-group" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <part-group>".into())),
            _ => {}
        }
    }
    Ok(is_brace)
}

/// Parse one `<part>` body: measures, notes, directions, cursor arithmetic
fn parse_part(reader: &mut Reader<&[u8]>) -> Result<Part, ParseError> {
    let mut part = Part {
        staves: 1,
        ..Default::default()
    };

    // Cursor in quarter lengths; divisions carries across measures until restated
    let mut cursor: f64 = 0.0;
    let mut divisions: i64 = 1;

    // Per-measure duration tracking
    let mut measure_number: u32 = 0;
    let mut measure_start: f64 = 0.0;
    let mut measure_max: f64 = 0.0;
    // 4/4 until a time signature says otherwise
    let mut nominal_bar: f64 = 4.0;
    let mut in_measure = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"measure" => {
                    measure_number += 1;
                    measure_start = cursor;
                    measure_max = cursor;
                    in_measure = true;
                }
                b"attributes" => {
                    if let Some((beats, beat_type)) =
                        parse_attributes(reader, &mut divisions, &mut part, cursor)?
                    {
                        if beat_type > 0 {
                            nominal_bar = beats as f64 * 4.0 / beat_type as f64;
                        }
                    }
                }
                b"note" => {
                    parse_note(reader, &mut part, &mut cursor, divisions)?;
                    measure_max = measure_max.max(cursor);
                }
                b"backup" => {
                    let dur = parse_duration_block(reader, b"backup")?;
                    cursor = (cursor - dur as f64 / divisions as f64).max(0.0);
                }
                b"forward" => {
                    let dur = parse_duration_block(reader, b"forward")?;
                    cursor += dur as f64 / divisions as f64;
                    measure_max = measure_max.max(cursor);
                }
                b"direction" => {
                    parse_direction(reader, &mut part, cursor)?;
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) => match e.name().as_ref() {
                b"measure" => {
                    if in_measure {
                        part.measures.push(MeasureInfo {
                            number: measure_number,
                            nominal_duration: nominal_bar,
                            actual_duration: measure_max - measure_start,
                        });
                        // Next measure resumes at the furthest point written
                        cursor = measure_max;
                        in_measure = false;
                    }
                }
                b"part" => break,
                _ => {}
            },
            Event::Eof => return Err(ParseError::Malformed("unterminated <part>".into())),
            _ => {}
        }
    }

    part.elements.sort_by(|a, b| {
        a.offset()
            .partial_cmp(&b.offset())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(part)
}

fn parse_attributes(
    reader: &mut Reader<&[u8]>,
    divisions: &mut i64,
    part: &mut Part,
    cursor: f64,
) -> Result<Option<(u32, u32)>, ParseError> {
    let mut beats: Option<u32> = None;
    let mut beat_type: Option<u32> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"divisions" => {
                    let text = read_text(reader, b"divisions")?;
                    match text.parse::<i64>() {
                        Ok(d) if d > 0 => *divisions = d,
                        _ => warn!("Ignoring invalid <divisions> value: {}", text),
                    }
                }
                b"staves" => {
                    let text = read_text(reader, b"staves")?;
                    if let Ok(n) = text.parse::<u32>() {
                        part.staves = n.max(1);
                    }
                }
                b"time" => {
                    let (b, bt) = parse_time(reader)?;
                    beats = b;
                    beat_type = bt;
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"attributes" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <attributes>".into())),
            _ => {}
        }
    }

    if let (Some(beats), Some(beat_type)) = (beats, beat_type) {
        part.elements.push(Element::TimeSignature {
            beats,
            beat_type,
            offset: cursor,
        });
        return Ok(Some((beats, beat_type)));
    }

    Ok(None)
}

fn parse_time(reader: &mut Reader<&[u8]>) -> Result<(Option<u32>, Option<u32>), ParseError> {
    let mut beats = None;
    let mut beat_type = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"beats" => beats = read_text(reader, b"beats")?.parse().ok(),
                b"beat-type" => beat_type = read_text(reader, b"beat-type")?.parse().ok(),
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"time" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <time>".into())),
            _ => {}
        }
    }
    Ok((beats, beat_type))
}

fn parse_note(
    reader: &mut Reader<&[u8]>,
    part: &mut Part,
    cursor: &mut f64,
    divisions: i64,
) -> Result<(), ParseError> {
    let mut pitch: Option<Pitch> = None;
    let mut is_rest = false;
    let mut is_chord = false;
    let mut duration: i64 = 0;
    let mut accidental: Option<String> = None;
    let mut articulations: Vec<String> = Vec::new();
    let mut lyric: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"pitch" => pitch = Some(parse_pitch(reader)?),
                b"rest" => {
                    is_rest = true;
                    skip_element(reader, b"rest")?;
                }
                b"duration" => {
                    duration = read_text(reader, b"duration")?.parse().unwrap_or(0);
                }
                b"accidental" => {
                    let text = read_text(reader, b"accidental")?;
                    if !text.is_empty() {
                        accidental = Some(text);
                    }
                }
                b"notations" => {
                    collect_articulations(reader, &mut articulations)?;
                }
                b"lyric" => {
                    if let Some(text) = parse_lyric(reader)? {
                        lyric = Some(text);
                    }
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"rest" => is_rest = true,
                b"chord" => is_chord = true,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"note" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <note>".into())),
            _ => {}
        }
    }

    if is_chord {
        // Chord members share the onset of the preceding note; fold them in
        if let Some(p) = pitch {
            fold_chord_pitch(part, p);
        }
        return Ok(());
    }

    let offset = *cursor;
    let dur = duration as f64 / divisions as f64;
    *cursor += dur;

    if is_rest {
        part.elements.push(Element::Rest { offset, duration: dur });
    } else if let Some(pitch) = pitch {
        part.elements.push(Element::Note {
            pitch,
            offset,
            duration: dur,
            accidental,
            articulations,
            lyric,
        });
    }

    Ok(())
}

/// Merge a `<chord/>`-flagged pitch into the most recent sounding element
fn fold_chord_pitch(part: &mut Part, pitch: Pitch) {
    match part.elements.last_mut() {
        Some(Element::Note { .. }) => {
            let Some(Element::Note {
                pitch: first,
                offset,
                duration,
                ..
            }) = part.elements.pop()
            else {
                unreachable!()
            };
            part.elements.push(Element::Chord {
                pitches: vec![first, pitch],
                offset,
                duration,
            });
        }
        Some(Element::Chord { pitches, .. }) => pitches.push(pitch),
        _ => warn!("Chord member with no preceding note, dropping"),
    }
}

fn parse_pitch(reader: &mut Reader<&[u8]>) -> Result<Pitch, ParseError> {
    let mut step = 'C';
    let mut alter: i8 = 0;
    let mut octave: i8 = 4;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"step" => {
                    let text = read_text(reader, b"step")?;
                    step = text.chars().next().unwrap_or('C');
                }
                b"alter" => {
                    alter = read_text(reader, b"alter")?
                        .parse::<f64>()
                        .map(|a| a.round() as i8)
                        .unwrap_or(0);
                }
                b"octave" => {
                    octave = read_text(reader, b"octave")?.parse().unwrap_or(4);
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"pitch" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <pitch>".into())),
            _ => {}
        }
    }

    Ok(Pitch { step, alter, octave })
}

fn collect_articulations(
    reader: &mut Reader<&[u8]>,
    articulations: &mut Vec<String>,
) -> Result<(), ParseError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.name().as_ref() == b"articulations" {
                    collect_articulation_names(reader, articulations)?;
                } else {
                    let tag = e.name().as_ref().to_vec();
                    skip_element(reader, &tag)?;
                }
            }
            Event::End(e) if e.name().as_ref() == b"notations" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <notations>".into())),
            _ => {}
        }
    }
    Ok(())
}

fn collect_articulation_names(
    reader: &mut Reader<&[u8]>,
    articulations: &mut Vec<String>,
) -> Result<(), ParseError> {
    loop {
        match reader.read_event()? {
            Event::Empty(e) => {
                articulations.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Start(e) => {
                let tag = e.name().as_ref().to_vec();
                articulations.push(String::from_utf8_lossy(&tag).into_owned());
                skip_element(reader, &tag)?;
            }
            Event::End(e) if e.name().as_ref() == b"articulations" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <articulations>".into())),
            _ => {}
        }
    }
    Ok(())
}

fn parse_lyric(reader: &mut Reader<&[u8]>) -> Result<Option<String>, ParseError> {
    let mut text = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.name().as_ref() == b"text" {
                    let t = read_text(reader, b"text")?;
                    if !t.is_empty() {
                        text = Some(t);
                    }
                } else {
                    let tag = e.name().as_ref().to_vec();
                    skip_element(reader, &tag)?;
                }
            }
            Event::End(e) if e.name().as_ref() == b"lyric" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <lyric>".into())),
            _ => {}
        }
    }
    Ok(text)
}

/// Read the `<duration>` child of a `<backup>` or `<forward>` block
fn parse_duration_block(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<i64, ParseError> {
    let mut duration = 0;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.name().as_ref() == b"duration" {
                    duration = read_text(reader, b"duration")?.parse().unwrap_or(0);
                } else {
                    let tag = e.name().as_ref().to_vec();
                    skip_element(reader, &tag)?;
                }
            }
            Event::End(e) if e.name().as_ref() == end_tag => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated cursor block".into())),
            _ => {}
        }
    }
    Ok(duration)
}

/// Parse `<direction>`: dynamics, metronome marks, tempo words
fn parse_direction(
    reader: &mut Reader<&[u8]>,
    part: &mut Part,
    offset: f64,
) -> Result<(), ParseError> {
    let mut words: Option<String> = None;
    let mut metronome_bpm: Option<f64> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"dynamics" => {
                    for marking in parse_dynamics(reader)? {
                        part.elements.push(Element::Dynamic {
                            marking,
                            offset,
                        });
                    }
                }
                b"metronome" => {
                    metronome_bpm = parse_metronome(reader)?;
                }
                b"words" => {
                    let text = read_text(reader, b"words")?;
                    if !text.is_empty() {
                        words = Some(text);
                    }
                }
                b"direction-type" => {} // descend
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"direction" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <direction>".into())),
            _ => {}
        }
    }

    if metronome_bpm.is_some() || words.is_some() {
        part.elements.push(Element::Tempo {
            text: words,
            bpm: metronome_bpm,
            offset,
        });
    }

    Ok(())
}

/// Dynamics markings are encoded as child element names (`<f/>`, `<mp/>`, ...)
fn parse_dynamics(reader: &mut Reader<&[u8]>) -> Result<Vec<String>, ParseError> {
    let mut markings = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) => {
                markings.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Start(e) => {
                let tag = e.name().as_ref().to_vec();
                markings.push(String::from_utf8_lossy(&tag).into_owned());
                skip_element(reader, &tag)?;
            }
            Event::End(e) if e.name().as_ref() == b"dynamics" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <dynamics>".into())),
            _ => {}
        }
    }
    Ok(markings)
}

/// Compute BPM in quarter notes from `<beat-unit>` and `<per-minute>`
fn parse_metronome(reader: &mut Reader<&[u8]>) -> Result<Option<f64>, ParseError> {
    let mut beat_unit: Option<String> = None;
    let mut per_minute: Option<f64> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"beat-unit" => beat_unit = Some(read_text(reader, b"beat-unit")?),
                b"per-minute" => per_minute = read_text(reader, b"per-minute")?.parse().ok(),
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"metronome" => break,
            Event::Eof => return Err(ParseError::Malformed("unterminated <metronome>".into())),
            _ => {}
        }
    }

    let Some(per_minute) = per_minute else {
        return Ok(None);
    };

    // Normalize to quarter-note BPM
    let unit_quarters = match beat_unit.as_deref() {
        Some("whole") => 4.0,
        Some("half") => 2.0,
        Some("eighth") => 0.5,
        Some("16th") => 0.25,
        _ => 1.0, // quarter or unstated
    };

    Ok(Some(per_minute * unit_quarters))
}

/// Read text content up to the matching end tag
fn read_text(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String, ParseError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => {
                text.push_str(&t.unescape()?);
            }
            Event::End(e) if e.name().as_ref() == end_tag => break,
            Event::Start(e) => {
                let tag = e.name().as_ref().to_vec();
                skip_element(reader, &tag)?;
            }
            Event::Eof => return Err(ParseError::Malformed("unterminated text element".into())),
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

/// Skip an already-opened element and all of its children
fn skip_element(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<(), ParseError> {
    let mut depth = 1u32;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == tag => depth += 1,
            Event::End(e) if e.name().as_ref() == tag => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => return Err(ParseError::Malformed("unterminated element while skipping".into())),
            _ => {}
        }
    }
    Ok(())
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
