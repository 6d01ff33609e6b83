//! HTTP API handlers

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::scores;
use crate::error::{ApiError, ApiResult};
use crate::models::{InputFormat, ScoreRecord, ScoreState};
use crate::pipeline::{queue, Pipeline};
use crate::AppState;

/// Largest accepted upload. Multi-page 300 DPI scans run to tens of
/// megabytes; the recognition timeout budget already scales that far.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Health check endpoint
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "nota-omr",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Accept a score upload and enqueue it for recognition.
///
/// Multipart fields: `file` (required), `title`, `composer`.
pub async fn upload_score(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut title: Option<String> = None;
    let mut composer: Option<String> = None;
    let mut file: Option<(String, String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("title") => {
                title = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("composer") => {
                composer = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| ApiError::BadRequest("File field needs a filename".into()))?;
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((stem_of(&filename), extension_of(&filename), data));
            }
            _ => {}
        }
    }

    let (stem, ext, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;

    if InputFormat::from_extension(&ext).is_none() {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type '.{}'; accepted: pdf, jpg, jpeg, png, tiff, tif, webp",
            ext
        )));
    }
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(stem);
    let composer = composer.filter(|c| !c.trim().is_empty());

    let score = ScoreRecord::new(title, composer, ext);

    let upload_path = Pipeline::upload_path(&state.config, score.id, &score.input_ext);
    if let Some(parent) = upload_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&upload_path, &data).await?;

    scores::save_score(&state.db, &score).await?;

    if !queue::submit(&state.job_tx, score.id).await {
        return Err(ApiError::Internal("Job queue is unavailable".into()));
    }

    info!(id = %score.id, title = %score.title, "Score uploaded and enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "id": score.id,
            "state": score.state,
        })),
    ))
}

#[derive(Debug, Serialize)]
pub struct ScoreSummary {
    pub id: Uuid,
    pub title: String,
    pub composer: Option<String>,
    pub state: ScoreState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// List all scores, newest first
pub async fn list_scores(State(state): State<AppState>) -> ApiResult<Json<Vec<ScoreSummary>>> {
    let records = scores::list_scores(&state.db).await?;
    let summaries = records
        .into_iter()
        .map(|r| ScoreSummary {
            id: r.id,
            title: r.title,
            composer: r.composer,
            state: r.state,
            created_at: r.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// Full score record, including the analysis payload when present
pub async fn get_score(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScoreRecord>> {
    let record = load_or_404(&state, id).await?;
    Ok(Json(record))
}

/// Serve the extracted MusicXML derivative
pub async fn serve_musicxml(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let record = load_or_404(&state, id).await?;
    serve_derivative(
        &record,
        record.musicxml_path.as_deref(),
        "application/vnd.recordare.musicxml+xml",
        "MusicXML",
    )
    .await
}

/// Serve the rendered MIDI derivative
pub async fn serve_midi(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let record = load_or_404(&state, id).await?;
    serve_derivative(&record, record.midi_path.as_deref(), "audio/midi", "MIDI").await
}

/// Generate a prose summary of an analyzed score
pub async fn generate_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = load_or_404(&state, id).await?;

    let results = record
        .results
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Score has not been analyzed yet".into()))?;

    let summary = state
        .summarizer
        .summarize(&record.title, results)
        .await
        .map_err(|e| match e {
            crate::services::summarizer::SummarizerError::NotConfigured => {
                ApiError::BadRequest(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({ "id": id, "summary": summary })))
}

async fn load_or_404(state: &AppState, id: Uuid) -> ApiResult<ScoreRecord> {
    scores::load_score(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Score {}", id)))
}

async fn serve_derivative(
    record: &ScoreRecord,
    path: Option<&std::path::Path>,
    content_type: &'static str,
    label: &str,
) -> ApiResult<impl IntoResponse> {
    if record.state == ScoreState::Purged {
        return Err(ApiError::Gone(format!(
            "{} for score {} was removed by scheduled cleanup",
            label, record.id
        )));
    }

    let path = path.ok_or_else(|| {
        ApiError::NotFound(format!("No {} derivative for score {}", label, record.id))
    })?;

    let bytes = tokio::fs::read(path).await.map_err(|_| {
        ApiError::NotFound(format!("{} derivative for score {} is missing", label, record.id))
    })?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// Oversize bodies are an input rejection in their own right, not a
/// malformed request
fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!(
            "Uploaded file exceeds the {} MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        ))
    } else {
        ApiError::BadRequest(format!("Malformed multipart body: {}", e))
    }
}

fn stem_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}
