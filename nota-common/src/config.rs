//! Configuration loading for Nota services
//!
//! Resolution priority per field: environment variable → TOML file → default.
//! The TOML file location itself comes from `NOTA_CONFIG` (default
//! `~/.config/nota/nota-omr.toml`); a missing file is not an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// On-disk TOML configuration (all fields optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub bind_address: Option<String>,
    pub database_path: Option<PathBuf>,
    pub temp_storage_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub recognizer_home: Option<PathBuf>,
    pub gradle_bin: Option<PathBuf>,
    pub cleanup_delay_secs: Option<u64>,
    pub summarizer_endpoint: Option<String>,
    pub summarizer_api_key: Option<String>,
}

/// Fully-resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP bind address, e.g. `127.0.0.1:5731`
    pub bind_address: String,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Per-job scratch workspaces live under this root
    pub temp_storage_dir: PathBuf,
    /// Uploads and derivative artifacts (served MusicXML/MIDI) live here
    pub data_dir: PathBuf,
    /// Recognition engine installation directory
    pub recognizer_home: PathBuf,
    /// Gradle launcher used to run the recognition engine
    pub gradle_bin: PathBuf,
    /// Delay before derivative artifacts are purged after a job finishes
    pub cleanup_delay_secs: u64,
    /// Generative summarization endpoint (Gemini-style generateContent)
    pub summarizer_endpoint: String,
    /// API key for the summarization endpoint (empty disables summaries)
    pub summarizer_api_key: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5731".to_string(),
            database_path: PathBuf::from("nota.db"),
            temp_storage_dir: std::env::temp_dir().join("nota"),
            data_dir: PathBuf::from("data"),
            recognizer_home: PathBuf::from("/app/audiveris"),
            gradle_bin: PathBuf::from("/opt/gradle-8.7/bin/gradle"),
            cleanup_delay_secs: 3600,
            summarizer_endpoint:
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
                    .to_string(),
            summarizer_api_key: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration with env → TOML → default resolution
    pub fn load() -> Self {
        let toml_path = std::env::var("NOTA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_toml_path());

        let toml = match read_toml_config(&toml_path) {
            Ok(Some(cfg)) => {
                info!("Loaded configuration from {}", toml_path.display());
                cfg
            }
            Ok(None) => TomlConfig::default(),
            Err(e) => {
                warn!("Failed to read {} ({}), using defaults", toml_path.display(), e);
                TomlConfig::default()
            }
        };

        Self::resolve(toml)
    }

    /// Merge a TOML layer with environment overrides on top of defaults
    pub fn resolve(toml: TomlConfig) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_string("NOTA_BIND_ADDRESS")
                .or(toml.bind_address)
                .unwrap_or(defaults.bind_address),
            database_path: env_path("NOTA_DATABASE_PATH")
                .or(toml.database_path)
                .unwrap_or(defaults.database_path),
            temp_storage_dir: env_path("NOTA_TEMP_STORAGE_DIR")
                .or(toml.temp_storage_dir)
                .unwrap_or(defaults.temp_storage_dir),
            data_dir: env_path("NOTA_DATA_DIR")
                .or(toml.data_dir)
                .unwrap_or(defaults.data_dir),
            recognizer_home: env_path("NOTA_RECOGNIZER_HOME")
                .or(toml.recognizer_home)
                .unwrap_or(defaults.recognizer_home),
            gradle_bin: env_path("NOTA_GRADLE_BIN")
                .or(toml.gradle_bin)
                .unwrap_or(defaults.gradle_bin),
            cleanup_delay_secs: env_string("NOTA_CLEANUP_DELAY_SECS")
                .and_then(|v| v.parse().ok())
                .or(toml.cleanup_delay_secs)
                .unwrap_or(defaults.cleanup_delay_secs),
            summarizer_endpoint: env_string("NOTA_SUMMARIZER_ENDPOINT")
                .or(toml.summarizer_endpoint)
                .unwrap_or(defaults.summarizer_endpoint),
            summarizer_api_key: env_string("NOTA_SUMMARIZER_API_KEY")
                .or(toml.summarizer_api_key)
                .unwrap_or(defaults.summarizer_api_key),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}

fn default_toml_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".config/nota/nota-omr.toml")
}

/// Read a TOML configuration file; `Ok(None)` when the file does not exist
pub fn read_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let cfg = toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    Ok(Some(cfg))
}

/// Write a TOML configuration file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
