//! Recognition artifact handling
//!
//! The engine leaves a compressed notation archive (`.mxl`, a zip) in the
//! job's output directory. This module locates it, validates it, and
//! extracts the plain notation document. All operations are pure functions
//! of the filesystem state; extraction is idempotent.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Archives at or below this size are recognition stubs, not real exports
pub const MIN_ARCHIVE_BYTES: u64 = 100;

/// Name of the extracted plain notation file
pub const NOTATION_FILENAME: &str = "score.xml";

#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No archive at all. `partial` notes whether the engine left
    /// intermediate project files, which indicates an aborted run rather
    /// than a no-op.
    #[error("{}", no_archive_message(.partial))]
    NoArchive { partial: bool },

    #[error("Notation archive is implausibly small ({size} bytes); recognition likely failed silently")]
    TooSmall { size: u64 },

    #[error("Notation archive contains no notation document entry")]
    NoNotationEntry,

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn no_archive_message(partial: &bool) -> &'static str {
    if *partial {
        "Recognition produced no notation archive; only partial project files were written"
    } else {
        "Recognition produced no notation archive"
    }
}

/// Find the notation archive in the engine's output directory.
/// With several candidates the lexicographically first wins, keeping the
/// choice deterministic across runs.
pub fn locate_archive(output_dir: &Path) -> Result<PathBuf, ArtifactError> {
    let mut archives = Vec::new();
    let mut partial = false;

    for entry in walk_files(output_dir)? {
        match entry.extension().and_then(|e| e.to_str()) {
            Some("mxl") => archives.push(entry),
            Some("omr") => partial = true,
            _ => {}
        }
    }

    archives.sort();
    archives
        .into_iter()
        .next()
        .ok_or(ArtifactError::NoArchive { partial })
}

/// Reject stub archives the engine sometimes leaves behind on silent failure
pub fn validate_archive(archive: &Path) -> Result<(), ArtifactError> {
    let size = std::fs::metadata(archive)?.len();
    if size <= MIN_ARCHIVE_BYTES {
        return Err(ArtifactError::TooSmall { size });
    }
    Ok(())
}

/// Extract the plain notation document into `dest_dir/score.xml`.
///
/// Root-level `.xml` entries are preferred; container metadata under
/// `META-INF/` is never the score. Falls back to any `.xml` entry when the
/// archive uses a nested layout. Idempotent: the output is a pure function
/// of the archive contents.
pub fn extract_plain_notation(archive: &Path, dest_dir: &Path) -> Result<PathBuf, ArtifactError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    let entry_name = pick_notation_entry(&mut zip)?;
    debug!(entry = %entry_name, archive = %archive.display(), "Extracting notation document");

    let mut contents = Vec::new();
    zip.by_name(&entry_name)?.read_to_end(&mut contents)?;

    std::fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(NOTATION_FILENAME);
    std::fs::write(&dest, &contents)?;

    Ok(dest)
}

fn pick_notation_entry<R: Read + std::io::Seek>(
    zip: &mut ZipArchive<R>,
) -> Result<String, ArtifactError> {
    let mut root_level: Vec<String> = Vec::new();
    let mut nested: Vec<String> = Vec::new();

    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if !name.to_lowercase().ends_with(".xml") {
            continue;
        }
        if name.starts_with("META-INF/") {
            continue;
        }
        if name.contains('/') {
            nested.push(name);
        } else {
            root_level.push(name);
        }
    }

    root_level.sort();
    nested.sort();

    root_level
        .into_iter()
        .next()
        .or_else(|| nested.into_iter().next())
        .ok_or(ArtifactError::NoNotationEntry)
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    const SCORE_XML: &[u8] =
        b"<?xml version=\"1.0\"?><score-partwise><part-list/></score-partwise>";

    #[test]
    fn locates_the_first_archive_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mxl"), b"bbb").unwrap();
        std::fs::write(dir.path().join("a.mxl"), b"aaa").unwrap();
        std::fs::write(dir.path().join("notes.log"), b"log").unwrap();

        let found = locate_archive(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "a.mxl");
    }

    #[test]
    fn missing_archive_reports_partial_project_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.omr"), b"project").unwrap();

        let err = locate_archive(dir.path()).unwrap_err();
        match err {
            ArtifactError::NoArchive { partial } => assert!(partial),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_stub_archives() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("stub.mxl");
        std::fs::write(&small, vec![0u8; 100]).unwrap();
        assert!(matches!(
            validate_archive(&small).unwrap_err(),
            ArtifactError::TooSmall { size: 100 }
        ));

        let ok = dir.path().join("real.mxl");
        std::fs::write(&ok, vec![0u8; 101]).unwrap();
        assert!(validate_archive(&ok).is_ok());
    }

    #[test]
    fn extracts_root_level_entry_over_container_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("score.mxl");
        write_archive(
            &archive,
            &[
                ("META-INF/container.xml", b"<container/>"),
                ("score.xml", SCORE_XML),
            ],
        );

        let dest = extract_plain_notation(&archive, &dir.path().join("extracted")).unwrap();
        assert_eq!(dest.file_name().unwrap(), NOTATION_FILENAME);
        assert_eq!(std::fs::read(&dest).unwrap(), SCORE_XML);
    }

    #[test]
    fn falls_back_to_nested_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("score.mxl");
        write_archive(
            &archive,
            &[
                ("META-INF/container.xml", b"<container/>"),
                ("inner/score.xml", SCORE_XML),
            ],
        );

        let dest = extract_plain_notation(&archive, dir.path()).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), SCORE_XML);
    }

    #[test]
    fn archive_without_notation_entry_errors() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("score.mxl");
        write_archive(&archive, &[("README.txt", b"hello")]);

        assert!(matches!(
            extract_plain_notation(&archive, dir.path()).unwrap_err(),
            ArtifactError::NoNotationEntry
        ));
    }

    #[test]
    fn extraction_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("score.mxl");
        write_archive(&archive, &[("score.xml", SCORE_XML)]);

        let first = extract_plain_notation(&archive, dir.path()).unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        let second = extract_plain_notation(&archive, dir.path()).unwrap();
        let second_bytes = std::fs::read(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }
}
