//! Pipeline orchestration tests
//!
//! Exercise the job lifecycle around a recognition engine that is absent:
//! every stage failure must leave the workspace removed, the slot count
//! restored, and a persisted failure state.

use std::time::Duration;

use image::{GrayImage, Luma};
use nota_common::ServiceConfig;
use nota_omr::db::{self, scores, slots};
use nota_omr::models::{ScoreRecord, ScoreState};
use nota_omr::pipeline::Pipeline;

struct TestEnv {
    pool: sqlx::SqlitePool,
    config: ServiceConfig,
    _dir: tempfile::TempDir,
}

async fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::init_database_pool(&dir.path().join("test.db"))
        .await
        .unwrap();

    let config = ServiceConfig {
        temp_storage_dir: dir.path().join("tmp"),
        data_dir: dir.path().join("data"),
        // points nowhere so the recognition stage always fails fast
        gradle_bin: dir.path().join("no-such-gradle"),
        recognizer_home: dir.path().to_path_buf(),
        cleanup_delay_secs: 0,
        ..Default::default()
    };
    std::fs::create_dir_all(&config.temp_storage_dir).unwrap();

    TestEnv { pool, config, _dir: dir }
}

fn write_upload_png(config: &ServiceConfig, score: &ScoreRecord) {
    let path = Pipeline::upload_path(config, score.id, &score.input_ext);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    GrayImage::from_pixel(100, 100, Luma([128u8])).save(&path).unwrap();
}

fn workspace_count(config: &ServiceConfig) -> usize {
    std::fs::read_dir(&config.temp_storage_dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn failed_recognition_cleans_up_and_persists_failure() {
    // Given: an enqueued raster upload and no recognition engine installed
    let env = test_env().await;
    let score = ScoreRecord::new("Test Scan".into(), None, "png".into());
    write_upload_png(&env.config, &score);
    scores::save_score(&env.pool, &score).await.unwrap();

    // When: the pipeline processes the job
    let pipeline = Pipeline::new(env.pool.clone(), env.config.clone());
    pipeline.process(score.id).await;

    // Then: the job failed, the workspace is gone, the slot was released
    let record = scores::load_score(&env.pool, score.id).await.unwrap().unwrap();
    assert!(matches!(record.state, ScoreState::Failed | ScoreState::Purged));
    assert!(record.error_message.is_some());
    assert_eq!(workspace_count(&env.config), 0);
    assert_eq!(slots::count_active_slots(&env.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn unsupported_extension_fails_before_recognition() {
    // Given: a record whose stored extension is outside the accepted set
    let env = test_env().await;
    let score = ScoreRecord::new("Bad Input".into(), None, "exe".into());
    scores::save_score(&env.pool, &score).await.unwrap();

    // When
    let pipeline = Pipeline::new(env.pool.clone(), env.config.clone());
    pipeline.process(score.id).await;

    // Then
    let record = scores::load_score(&env.pool, score.id).await.unwrap().unwrap();
    assert!(matches!(record.state, ScoreState::Failed | ScoreState::Purged));
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("Unsupported input extension"));
    assert_eq!(workspace_count(&env.config), 0);
    assert_eq!(slots::count_active_slots(&env.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_upload_fails_with_a_clear_message() {
    // Given: a record with no staged upload on disk
    let env = test_env().await;
    let score = ScoreRecord::new("Ghost".into(), None, "pdf".into());
    scores::save_score(&env.pool, &score).await.unwrap();

    // When
    let pipeline = Pipeline::new(env.pool.clone(), env.config.clone());
    pipeline.process(score.id).await;

    // Then
    let record = scores::load_score(&env.pool, score.id).await.unwrap().unwrap();
    assert!(matches!(record.state, ScoreState::Failed | ScoreState::Purged));
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("missing"));
    assert_eq!(workspace_count(&env.config), 0);
    assert_eq!(slots::count_active_slots(&env.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn deferred_cleanup_purges_uploads_and_record() {
    // Given: a processed-or-failed job with a zero cleanup delay
    let env = test_env().await;
    let score = ScoreRecord::new("Short Lived".into(), None, "png".into());
    write_upload_png(&env.config, &score);
    scores::save_score(&env.pool, &score).await.unwrap();

    let upload = Pipeline::upload_path(&env.config, score.id, "png");
    assert!(upload.exists());

    // When: the pipeline finishes and scheduled cleanup runs
    let pipeline = Pipeline::new(env.pool.clone(), env.config.clone());
    pipeline.process(score.id).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Then: the upload is gone and the record shows purged
    assert!(!upload.exists());
    let record = scores::load_score(&env.pool, score.id).await.unwrap().unwrap();
    assert_eq!(record.state, ScoreState::Purged);
    assert!(record.musicxml_path.is_none());
    assert!(record.midi_path.is_none());
}

#[tokio::test]
async fn processing_an_unknown_job_is_a_no_op() {
    let env = test_env().await;
    let pipeline = Pipeline::new(env.pool.clone(), env.config.clone());

    // Must not panic or leave any state behind
    pipeline.process(uuid::Uuid::new_v4()).await;
    assert_eq!(slots::count_active_slots(&env.pool).await.unwrap(), 0);
    assert_eq!(workspace_count(&env.config), 0);
}
