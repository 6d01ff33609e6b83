//! Database access for nota-omr

pub mod scores;
pub mod slots;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize nota-omr specific tables
///
/// Creates scores and recognition_slots tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            composer TEXT,
            input_ext TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'unprocessed',
            results TEXT,
            musicxml_path TEXT,
            midi_path TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tracks in-flight recognition runs for concurrency-aware memory budgeting
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recognition_slots (
            slot_id TEXT PRIMARY KEY,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (scores, recognition_slots)");

    Ok(())
}
