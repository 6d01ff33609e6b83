//! Recognition and analysis pipeline
//!
//! One job runs the stages strictly in order: stage input → recognize →
//! extract artifact → analyze → persist. The resource slot is released and
//! the workspace torn down on every exit path, and a deferred cleanup of
//! the served derivatives is scheduled whichever way the job ends.

pub mod artifacts;
pub mod governor;
pub mod invoker;
pub mod queue;
pub mod workspace;

use std::path::PathBuf;
use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use nota_common::ServiceConfig;

use crate::analysis::{self, Facet};
use crate::db::scores;
use crate::models::{InputFormat, ScoreRecord, ScoreState};
use crate::notation;
use crate::preprocess;
use crate::text_extraction::{self, TextContent};

use artifacts::ArtifactError;
use governor::ResourceGovernor;
use invoker::{RecognitionError, RecognitionInvoker};
use workspace::Workspace;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported input extension: {0}")]
    UnsupportedInput(String),

    #[error("Uploaded input file is missing: {0}")]
    MissingInput(PathBuf),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Image preprocessing failed: {0}")]
    Preprocess(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs jobs end to end
pub struct Pipeline {
    pool: SqlitePool,
    config: ServiceConfig,
    governor: ResourceGovernor,
    invoker: RecognitionInvoker,
}

impl Pipeline {
    pub fn new(pool: SqlitePool, config: ServiceConfig) -> Self {
        let governor = ResourceGovernor::new(pool.clone());
        let invoker = RecognitionInvoker::new(
            config.gradle_bin.clone(),
            config.recognizer_home.clone(),
        );
        Self {
            pool,
            config,
            governor,
            invoker,
        }
    }

    /// Where the original upload for a job is stored
    pub fn upload_path(config: &ServiceConfig, id: Uuid, ext: &str) -> PathBuf {
        config.data_dir.join("uploads").join(format!("{}.{}", id, ext))
    }

    /// Where a job's served derivatives live until deferred cleanup
    pub fn derivatives_dir(config: &ServiceConfig, id: Uuid) -> PathBuf {
        config.data_dir.join("derivatives").join(id.to_string())
    }

    /// Run the whole pipeline for one job. Never returns an error: every
    /// failure ends as a persisted `failed` state on the record.
    pub async fn process(&self, job_id: Uuid) {
        let mut score = match scores::load_score(&self.pool, job_id).await {
            Ok(Some(score)) => score,
            Ok(None) => {
                warn!("Job {} has no score record, skipping", job_id);
                return;
            }
            Err(e) => {
                error!("Failed to load score {}: {}", job_id, e);
                return;
            }
        };

        info!(job = %job_id, "Pipeline starting");
        score.state = ScoreState::Processing;
        self.save(&score).await;

        let slot = self.governor.acquire_slot().await;

        let outcome = self.run_stages(&mut score).await;

        // Slot release happens on every exit path, matched to the acquire
        self.governor.release_slot(slot).await;

        if let Err(e) = outcome {
            warn!(job = %job_id, "Pipeline failed: {}", e);
            score.state = ScoreState::Failed;
            score.error_message = Some(e.to_string());
        }

        score.updated_at = chrono::Utc::now();
        self.save(&score).await;
        info!(job = %job_id, state = %score.state, "Pipeline finished");

        self.schedule_cleanup(&score);
    }

    /// The fallible stage sequence. The workspace is owned here and torn
    /// down on drop, whichever way this returns.
    async fn run_stages(&self, score: &mut ScoreRecord) -> Result<(), PipelineError> {
        let format = InputFormat::from_extension(&score.input_ext)
            .ok_or_else(|| PipelineError::UnsupportedInput(score.input_ext.clone()))?;

        let ws = Workspace::create(&self.config.temp_storage_dir, score.id, &score.input_ext)?;

        // Stage the uploaded input into the workspace
        let upload = Self::upload_path(&self.config, score.id, &score.input_ext);
        if !upload.exists() {
            return Err(PipelineError::MissingInput(upload));
        }
        std::fs::copy(&upload, &ws.input_path)?;

        // Raster inputs are normalized before recognition
        let recognition_input = if format.is_raster() {
            let preprocessed = ws.root().join("preprocessed.png");
            preprocess::preprocess_image(&ws.input_path, &preprocessed)
                .map_err(|e| PipelineError::Preprocess(e.to_string()))?;
            preprocessed
        } else {
            ws.input_path.clone()
        };

        // Recognition, with load-scaled memory budget
        let total_memory = governor::total_memory_gb();
        let ceiling = governor::compute_memory_ceiling(total_memory, self.governor.running_jobs().await);
        self.invoker
            .run(
                &recognition_input,
                &ws.output_dir,
                ceiling,
                format.is_raster(),
                governor::max_sheet_dimension(total_memory),
            )
            .await?;

        // Artifact extraction
        let archive = artifacts::locate_archive(&ws.output_dir)?;
        artifacts::validate_archive(&archive)?;
        let notation_path = artifacts::extract_plain_notation(&archive, ws.root())?;

        // Text extraction enriches the result but never fails the job
        let text_content = match text_extraction::extract_text(&upload, format).await {
            Ok(content) => Facet::Value(content),
            Err(e) => {
                warn!(job = %score.id, "Text extraction failed: {}", e);
                Facet::<TextContent>::error(e.to_string())
            }
        };

        // Parse once, analyze all facets against the one parsed model.
        // A parse failure is job-fatal for the processed flag, but the
        // all-error facet payload is still persisted.
        let xml = std::fs::read_to_string(&notation_path)?;
        let doc = match notation::parse_musicxml(&xml) {
            Ok(doc) => doc,
            Err(e) => {
                let message = format!("Notation document could not be parsed: {}", e);
                let result = analysis::all_facets_error(&message, text_content);
                score.results = Some(serde_json::to_value(&result).unwrap_or_default());
                score.state = ScoreState::Failed;
                score.error_message = Some(message);
                self.publish_musicxml(score, &notation_path)?;
                return Ok(());
            }
        };

        let result = analysis::analyze(&doc, text_content);

        self.publish_musicxml(score, &notation_path)?;
        self.publish_midi(score, &doc);

        score.results = Some(serde_json::to_value(&result).unwrap_or_default());
        if result.core_facets_ok() {
            score.state = ScoreState::Processed;
            score.error_message = None;
        } else {
            score.state = ScoreState::Failed;
            score.error_message = Some(format!(
                "Analysis completed with errors in core facets: {}",
                result.core_facet_failures().join(", ")
            ));
        }

        Ok(())
    }

    /// Copy the extracted notation document out of the workspace so it can
    /// be served after teardown
    fn publish_musicxml(
        &self,
        score: &mut ScoreRecord,
        notation_path: &std::path::Path,
    ) -> Result<(), PipelineError> {
        let derivatives = Self::derivatives_dir(&self.config, score.id);
        std::fs::create_dir_all(&derivatives)?;
        let dest = derivatives.join(artifacts::NOTATION_FILENAME);
        std::fs::copy(notation_path, &dest)?;
        score.musicxml_path = Some(dest);
        Ok(())
    }

    /// MIDI is best-effort: a rendering failure is logged and the job
    /// carries on without it
    fn publish_midi(&self, score: &mut ScoreRecord, doc: &notation::ScoreDocument) {
        let bytes = notation::midi::render_midi(doc);
        let dest = Self::derivatives_dir(&self.config, score.id).join("score.mid");
        match std::fs::write(&dest, &bytes) {
            Ok(()) => score.midi_path = Some(dest),
            Err(e) => warn!(job = %score.id, "Failed to write MIDI derivative: {}", e),
        }
    }

    /// Persist the record; a save failure during failure handling must not
    /// propagate further
    async fn save(&self, score: &ScoreRecord) {
        if let Err(e) = scores::save_score(&self.pool, score).await {
            error!(job = %score.id, "Failed to save score record: {}", e);
        }
    }

    /// Deferred removal of the upload and served derivatives, then the
    /// record flips to `purged`
    fn schedule_cleanup(&self, score: &ScoreRecord) {
        let delay = Duration::from_secs(self.config.cleanup_delay_secs);
        let pool = self.pool.clone();
        let upload = Self::upload_path(&self.config, score.id, &score.input_ext);
        let derivatives = Self::derivatives_dir(&self.config, score.id);
        let id = score.id;

        queue::schedule(delay, async move {
            cleanup_job_files(&pool, id, upload, derivatives).await;
        });
    }
}

/// Remove a finished job's on-disk leftovers and mark the record purged
async fn cleanup_job_files(pool: &SqlitePool, id: Uuid, upload: PathBuf, derivatives: PathBuf) {
    if upload.exists() {
        if let Err(e) = std::fs::remove_file(&upload) {
            warn!(job = %id, "Cleanup failed to remove upload: {}", e);
        }
    }
    if derivatives.exists() {
        if let Err(e) = std::fs::remove_dir_all(&derivatives) {
            warn!(job = %id, "Cleanup failed to remove derivatives: {}", e);
        }
    }

    if let Err(e) = scores::mark_purged(pool, id).await {
        warn!(job = %id, "Cleanup failed to mark record purged: {}", e);
    } else {
        info!(job = %id, "Job artifacts purged");
    }
}
