//! Score record database operations

use std::path::PathBuf;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use nota_common::{Error, Result};

use crate::models::{ScoreRecord, ScoreState};

/// Save a score record, overwriting an existing row with the same id
///
/// Result delivery is last-writer-wins: a re-run of the same job simply
/// replaces the previous row contents.
pub async fn save_score(pool: &SqlitePool, score: &ScoreRecord) -> Result<()> {
    // Prepare all data BEFORE acquiring database connection
    let id = score.id.to_string();
    let state = score.state.as_str();
    let results = score
        .results
        .as_ref()
        .map(|r| serde_json::to_string(r))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;
    let musicxml_path = score.musicxml_path.as_ref().map(|p| p.display().to_string());
    let midi_path = score.midi_path.as_ref().map(|p| p.display().to_string());
    let created_at = score.created_at.to_rfc3339();
    let updated_at = score.updated_at.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO scores (
            id, title, composer, input_ext, state,
            results, musicxml_path, midi_path, error_message,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            composer = excluded.composer,
            state = excluded.state,
            results = excluded.results,
            musicxml_path = excluded.musicxml_path,
            midi_path = excluded.midi_path,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&id)
    .bind(&score.title)
    .bind(&score.composer)
    .bind(&score.input_ext)
    .bind(state)
    .bind(&results)
    .bind(&musicxml_path)
    .bind(&midi_path)
    .bind(&score.error_message)
    .bind(&created_at)
    .bind(&updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a score record by id
pub async fn load_score(pool: &SqlitePool, id: Uuid) -> Result<Option<ScoreRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, composer, input_ext, state,
               results, musicxml_path, midi_path, error_message,
               created_at, updated_at
        FROM scores
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_score).transpose()
}

/// List all score records, newest first
pub async fn list_scores(pool: &SqlitePool) -> Result<Vec<ScoreRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, composer, input_ext, state,
               results, musicxml_path, midi_path, error_message,
               created_at, updated_at
        FROM scores
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_score).collect()
}

/// Mark a score purged after deferred cleanup removed its derivatives
pub async fn mark_purged(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE scores
        SET state = 'purged', musicxml_path = NULL, midi_path = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_score(row: sqlx::sqlite::SqliteRow) -> Result<ScoreRecord> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse score id: {}", e)))?;

    let state_str: String = row.get("state");
    let state = ScoreState::parse(&state_str)
        .ok_or_else(|| Error::Internal(format!("Unknown score state: {}", state_str)))?;

    let results: Option<String> = row.get("results");
    let results = results
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize results: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(ScoreRecord {
        id,
        title: row.get("title"),
        composer: row.get("composer"),
        input_ext: row.get("input_ext"),
        state,
        results,
        musicxml_path: row.get::<Option<String>, _>("musicxml_path").map(PathBuf::from),
        midi_path: row.get::<Option<String>, _>("midi_path").map(PathBuf::from),
        error_message: row.get("error_message"),
        created_at,
        updated_at,
    })
}
