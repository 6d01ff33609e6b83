//! Recognition engine invocation
//!
//! Runs the external OMR engine (Audiveris, launched through gradle) as a
//! batch process against one staged input file, with a size-scaled wall
//! clock budget and a memory ceiling from the resource governor. Stderr is
//! classified into actionable diagnostics before being surfaced.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Timeout bounds in seconds
pub const MIN_TIMEOUT_SECS: u64 = 450;
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Seconds of budget granted per megabyte of input
const SECS_PER_MB: u64 = 10;

#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Interline spacing below the engine's threshold: the scan resolution
    /// is too coarse to separate staff lines
    #[error("Image resolution is too low for recognition. Please rescan the sheet music at 300 DPI or higher and upload again.")]
    LowResolution,

    /// The engine gave up before producing an export
    #[error("Recognition could not fully transcribe this score. The input may be blurry, skewed, or handwritten; a cleaner, higher-contrast scan usually helps.")]
    TranscriptionIncomplete,

    /// The engine exhausted its heap ceiling
    #[error("Recognition ran out of memory processing this file. The input may be too large; try splitting it into fewer pages or reducing the image size.")]
    OutOfMemory,

    #[error("Recognition timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("Recognition failed: {0}")]
    Failed(String),

    #[error("Failed to launch recognition engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Wall-clock budget for one run, scaled by input size and clamped so tiny
/// files still get a generous floor and huge ones cannot block a worker
/// indefinitely
pub fn timeout_budget_secs(file_size_bytes: u64) -> u64 {
    let mb = file_size_bytes / (1024 * 1024);
    (mb * SECS_PER_MB).clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}

/// Invokes the external recognition engine
pub struct RecognitionInvoker {
    gradle_bin: PathBuf,
    recognizer_home: PathBuf,
}

impl RecognitionInvoker {
    pub fn new(gradle_bin: PathBuf, recognizer_home: PathBuf) -> Self {
        Self {
            gradle_bin,
            recognizer_home,
        }
    }

    /// Run recognition for one input file, writing into `output_dir`.
    /// `is_raster` switches on the image-specific engine options;
    /// `max_sheet_dimension` caps accepted page size on small hosts.
    pub async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        memory_ceiling_gb: f64,
        is_raster: bool,
        max_sheet_dimension: u32,
    ) -> Result<(), RecognitionError> {
        let file_size = std::fs::metadata(input)?.len();
        let budget_secs = timeout_budget_secs(file_size);

        let heap_mb = (memory_ceiling_gb * 1024.0).round() as u64;
        let cmd_args = build_cmd_args(input, output_dir, is_raster, max_sheet_dimension);

        info!(
            input = %input.display(),
            heap_mb,
            budget_secs,
            "Starting recognition run"
        );
        debug!(args = %cmd_args, "Recognition engine arguments");

        let mut command = Command::new(&self.gradle_bin);
        command
            .current_dir(&self.recognizer_home)
            .arg("run")
            .arg(format!("-PjvmLineArgs=-Xmx{}m", heap_mb))
            .arg(format!("-PcmdLineArgs={}", cmd_args))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child must not linger once we drop it
            .kill_on_drop(true);

        let child = command.spawn()?;

        let output = match tokio::time::timeout(
            Duration::from_secs(budget_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(RecognitionError::TimedOut { secs: budget_secs }),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        info!(input = %input.display(), "Recognition run finished");
        Ok(())
    }
}

/// Comma-joined argument list passed through the gradle property
fn build_cmd_args(
    input: &Path,
    output_dir: &Path,
    is_raster: bool,
    max_sheet_dimension: u32,
) -> String {
    let mut args: Vec<String> = vec![
        "-batch".to_string(),
        "-export".to_string(),
        "-output".to_string(),
        output_dir.display().to_string(),
    ];

    if is_raster {
        // Scanned images need interline hints and a page-size guard;
        // PDFs carry their own resolution metadata
        for option in [
            "org.audiveris.omr.sheet.Scale.targetInterline=20".to_string(),
            "org.audiveris.omr.sheet.Scale.minInterline=12".to_string(),
            format!(
                "org.audiveris.omr.sheet.Picture.maxSheetDimension={}",
                max_sheet_dimension
            ),
            "org.audiveris.omr.text.tesseract.TesseractOCR.useOCR=true".to_string(),
            "org.audiveris.omr.classifier.SampleRepository.useRepository=true".to_string(),
        ] {
            args.push("-option".to_string());
            args.push(option);
        }
    }

    args.push(input.display().to_string());
    args.join(",")
}

/// Map engine stderr onto a user-actionable diagnostic
fn classify_failure(stderr: &str) -> RecognitionError {
    if stderr.contains("too low interline value") {
        RecognitionError::LowResolution
    } else if stderr.contains("Could not export since transcription did not complete successfully") {
        RecognitionError::TranscriptionIncomplete
    } else if stderr.contains("OutOfMemoryError") {
        RecognitionError::OutOfMemory
    } else {
        let mut excerpt: String = stderr.trim().chars().take(200).collect();
        if excerpt.is_empty() {
            excerpt = "engine exited with an error and no diagnostics".to_string();
        }
        RecognitionError::Failed(excerpt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn timeout_respects_bounds() {
        assert_eq!(timeout_budget_secs(0), MIN_TIMEOUT_SECS);
        assert_eq!(timeout_budget_secs(10 * MB), MIN_TIMEOUT_SECS);
        assert_eq!(timeout_budget_secs(50 * MB), 500);
        assert_eq!(timeout_budget_secs(60 * MB), MAX_TIMEOUT_SECS);
        assert_eq!(timeout_budget_secs(u64::MAX / 2), MAX_TIMEOUT_SECS);
    }

    #[test]
    fn timeout_is_monotonically_non_decreasing() {
        let mut previous = 0;
        for mb in 0..100 {
            let budget = timeout_budget_secs(mb * MB);
            assert!(budget >= previous, "budget shrank at {} MB", mb);
            previous = budget;
        }
    }

    #[test]
    fn interline_diagnostic_maps_to_resolution_advice() {
        let err = classify_failure("FATAL: too low interline value: 8, exiting");
        assert!(matches!(err, RecognitionError::LowResolution));
        assert!(err.to_string().contains("300 DPI"));
    }

    #[test]
    fn incomplete_transcription_maps_to_input_advice() {
        let err = classify_failure(
            "WARN: Could not export since transcription did not complete successfully",
        );
        assert!(matches!(err, RecognitionError::TranscriptionIncomplete));
    }

    #[test]
    fn oom_maps_to_size_advice() {
        let err = classify_failure("java.lang.OutOfMemoryError: Java heap space");
        assert!(matches!(err, RecognitionError::OutOfMemory));
    }

    #[test]
    fn unknown_failures_carry_a_bounded_excerpt() {
        let noise = "x".repeat(5000);
        let err = classify_failure(&noise);
        match err {
            RecognitionError::Failed(msg) => assert_eq!(msg.len(), 200),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn raster_inputs_get_image_options() {
        let args = build_cmd_args(Path::new("/w/input.png"), Path::new("/w/out"), true, 8192);
        assert!(args.contains("-batch,-export,-output,/w/out"));
        assert!(args.contains("maxSheetDimension=8192"));
        assert!(args.contains("minInterline=12"));
        assert!(args.ends_with("/w/input.png"));
    }

    #[test]
    fn raster_options_use_the_engine_option_keys() {
        let args = build_cmd_args(Path::new("/w/input.png"), Path::new("/w/out"), true, 6144);
        assert!(args.contains("org.audiveris.omr.sheet.Scale.targetInterline=20"));
        assert!(args.contains("org.audiveris.omr.text.tesseract.TesseractOCR.useOCR=true"));
        // the classifier's sample repository stays enabled
        assert!(args.contains("org.audiveris.omr.classifier.SampleRepository.useRepository=true"));
        assert!(!args.contains("defaultInterline"));
    }

    #[test]
    fn pdf_inputs_skip_image_options() {
        let args = build_cmd_args(Path::new("/w/input.pdf"), Path::new("/w/out"), false, 8192);
        assert!(!args.contains("Interline"));
        assert!(args.ends_with("/w/input.pdf"));
    }
}
