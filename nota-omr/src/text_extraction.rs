//! Text extraction from uploaded inputs
//!
//! PDFs go through `pdftotext`; raster images go through `tesseract`.
//! The raw text is then filtered line by line and classified into title,
//! composer, lyrics, performance instructions, and leftovers. The result
//! enriches the analysis payload; extraction failure never fails a job.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::models::InputFormat;

/// Fewer embedded characters than this means the PDF is image-only
const MIN_EMBEDDED_TEXT_CHARS: usize = 50;

/// Shown instead of classified text when a PDF has no text layer
pub const IMAGE_BASED_PDF_MESSAGE: &str =
    "Image-based PDF detected; no embedded text layer to extract";

#[derive(Debug, Error)]
pub enum TextExtractionError {
    #[error("Text extraction tool failed: {0}")]
    Tool(String),

    #[error("Failed to launch text extraction tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured text pulled from the uploaded file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextContent {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub lyrics: Vec<String>,
    pub performance_instructions: Vec<String>,
    pub other_text: Vec<String>,
    /// Present when extraction had nothing useful to say (e.g. image-only PDF)
    pub message: Option<String>,
}

/// Extract and classify text from one input file
pub async fn extract_text(
    path: &Path,
    format: InputFormat,
) -> Result<TextContent, TextExtractionError> {
    let raw = match format {
        InputFormat::Pdf => {
            let text = run_tool("pdftotext", &[path.as_os_str(), "-".as_ref()]).await?;
            if text.chars().filter(|c| !c.is_whitespace()).count() < MIN_EMBEDDED_TEXT_CHARS {
                return Ok(TextContent {
                    message: Some(IMAGE_BASED_PDF_MESSAGE.to_string()),
                    ..Default::default()
                });
            }
            text
        }
        _ => run_tool("tesseract", &[path.as_os_str(), "stdout".as_ref()]).await?,
    };

    debug!(chars = raw.len(), "Extracted raw text");
    Ok(classify_text(&raw))
}

async fn run_tool(
    program: &str,
    args: &[&std::ffi::OsStr],
) -> Result<String, TextExtractionError> {
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TextExtractionError::Tool(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim().chars().take(200).collect::<String>()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn composer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:by|music by|words by|composed by|arr(?:anged)?\.? by)\s+(.{2,60})$")
            .expect("composer pattern is valid")
    })
}

fn instruction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(allegro|andante|adagio|moderato|largo|presto|vivace|legato|staccato|rit(?:ard)?\.?|rall\.?|cresc\.?|dim\.?|a tempo|da capo|dal segno|fine|con brio|dolce|espressivo|tempo)\b",
        )
        .expect("instruction pattern is valid")
    })
}

/// Classify raw extracted text into the structured payload
pub fn classify_text(raw: &str) -> TextContent {
    let mut content = TextContent::default();

    for line in raw.lines() {
        let line = line.trim();
        if !is_plausible_line(line) {
            continue;
        }

        if let Some(captures) = composer_regex().captures(line) {
            if content.composer.is_none() {
                content.composer = Some(captures[1].trim().to_string());
            }
            continue;
        }

        if instruction_regex().is_match(line) && line.split_whitespace().count() <= 6 {
            content.performance_instructions.push(line.to_string());
            continue;
        }

        if content.title.is_none() && looks_like_title(line) {
            content.title = Some(line.to_string());
            continue;
        }

        if looks_like_lyrics(line) {
            content.lyrics.push(line.to_string());
        } else {
            content.other_text.push(line.to_string());
        }
    }

    content
}

/// OCR output is noisy; drop lines that are mostly junk
fn is_plausible_line(line: &str) -> bool {
    if line.len() < 2 || line.len() > 200 {
        return false;
    }
    let alphabetic = line.chars().filter(|c| c.is_alphabetic()).count();
    alphabetic * 2 >= line.chars().filter(|c| !c.is_whitespace()).count()
}

/// Titles tend to be short and mostly capitalized
fn looks_like_title(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() || words.len() > 8 {
        return false;
    }
    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    capitalized * 2 > words.len()
}

/// Lyric lines run long and lowercase, often with syllable hyphens
fn looks_like_lyrics(line: &str) -> bool {
    let words = line.split_whitespace().count();
    if words < 3 {
        return false;
    }
    let lowercase_starts = line
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_lowercase()))
        .count();
    line.contains(" - ") || lowercase_starts * 2 >= words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_title_composer_and_instructions() {
        let raw = "Amazing Grace\nby John Newton\nAndante\na-maz-ing grace how sweet the sound\nthat saved a wretch like me\n";
        let content = classify_text(raw);

        assert_eq!(content.title.as_deref(), Some("Amazing Grace"));
        assert_eq!(content.composer.as_deref(), Some("John Newton"));
        assert_eq!(content.performance_instructions, vec!["Andante"]);
        assert_eq!(content.lyrics.len(), 2);
    }

    #[test]
    fn junk_ocr_lines_are_dropped() {
        let raw = "===#@!#%===\n..\nReal Title Here\n|||///|||\n";
        let content = classify_text(raw);
        assert_eq!(content.title.as_deref(), Some("Real Title Here"));
        assert!(content.other_text.is_empty());
    }

    #[test]
    fn long_prose_goes_to_other_text() {
        let raw = "Copyright 2003 Published By Universal Edition London New York And Associated Offices Worldwide Reserved\n";
        let content = classify_text(raw);
        assert!(content.title.is_none());
        assert_eq!(content.other_text.len(), 1);
    }

    #[test]
    fn instruction_words_in_long_lines_are_not_instructions() {
        let raw = "the tempo of life kept changing around us every single day\n";
        let content = classify_text(raw);
        assert!(content.performance_instructions.is_empty());
        assert_eq!(content.lyrics.len(), 1);
    }

    #[test]
    fn arranger_credit_matches_composer_pattern() {
        let content = classify_text("arr. by Claude Debussy\n");
        assert_eq!(content.composer.as_deref(), Some("Claude Debussy"));
    }
}
