//! Data models for score recognition jobs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a score record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreState {
    /// Uploaded, waiting in the job queue
    Unprocessed,
    /// Recognition and analysis in progress
    Processing,
    /// All required analysis facets produced without error
    Processed,
    /// Pipeline failed, or a required facet carries an error
    Failed,
    /// Derivative artifacts deleted by deferred cleanup
    Purged,
}

impl ScoreState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreState::Unprocessed => "unprocessed",
            ScoreState::Processing => "processing",
            ScoreState::Processed => "processed",
            ScoreState::Failed => "failed",
            ScoreState::Purged => "purged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unprocessed" => Some(ScoreState::Unprocessed),
            "processing" => Some(ScoreState::Processing),
            "processed" => Some(ScoreState::Processed),
            "failed" => Some(ScoreState::Failed),
            "purged" => Some(ScoreState::Purged),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input file formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl InputFormat {
    /// Map a lowercase file extension to a format; unknown extensions are rejected
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(InputFormat::Pdf),
            "jpg" | "jpeg" => Some(InputFormat::Jpeg),
            "png" => Some(InputFormat::Png),
            "tiff" | "tif" => Some(InputFormat::Tiff),
            "webp" => Some(InputFormat::Webp),
            _ => None,
        }
    }

    pub fn is_raster(&self) -> bool {
        !matches!(self, InputFormat::Pdf)
    }
}

/// A score record as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Uuid,
    pub title: String,
    pub composer: Option<String>,
    /// Original upload extension (lowercase, no dot)
    pub input_ext: String,
    pub state: ScoreState,
    /// Full analysis results JSON (facets + text content), present once processing ends
    pub results: Option<serde_json::Value>,
    pub musicxml_path: Option<PathBuf>,
    pub midi_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn new(title: String, composer: Option<String>, input_ext: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            composer,
            input_ext,
            state: ScoreState::Unprocessed,
            results: None,
            musicxml_path: None,
            midi_path: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            ScoreState::Unprocessed,
            ScoreState::Processing,
            ScoreState::Processed,
            ScoreState::Failed,
            ScoreState::Purged,
        ] {
            assert_eq!(ScoreState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ScoreState::parse("bogus"), None);
    }

    #[test]
    fn extension_mapping_accepts_known_formats() {
        assert_eq!(InputFormat::from_extension("pdf"), Some(InputFormat::Pdf));
        assert_eq!(InputFormat::from_extension("jpg"), Some(InputFormat::Jpeg));
        assert_eq!(InputFormat::from_extension("tif"), Some(InputFormat::Tiff));
        assert_eq!(InputFormat::from_extension("webp"), Some(InputFormat::Webp));
        assert_eq!(InputFormat::from_extension("exe"), None);
    }

    #[test]
    fn pdf_is_not_raster() {
        assert!(!InputFormat::Pdf.is_raster());
        assert!(InputFormat::Png.is_raster());
    }
}
