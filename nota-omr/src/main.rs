//! nota-omr - Sheet Music Recognition Service
//!
//! Accepts sheet-music uploads (PDF or scanned images), runs them through
//! an external optical music recognition engine, and serves structured
//! analysis plus MusicXML/MIDI derivatives over HTTP.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use nota_common::ServiceConfig;
use nota_omr::pipeline::{queue, Pipeline};
use nota_omr::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting nota-omr (Sheet Music Recognition) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load();
    info!("Temp storage: {}", config.temp_storage_dir.display());
    info!("Data directory: {}", config.data_dir.display());
    info!("Recognition engine: {}", config.recognizer_home.display());

    std::fs::create_dir_all(&config.temp_storage_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let db_pool = nota_omr::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    // Pipeline worker drains the job queue in the background
    let pipeline = Pipeline::new(db_pool.clone(), config.clone());
    let job_tx = queue::start_worker(pipeline);

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db_pool, config, job_tx);
    let app = nota_omr::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
