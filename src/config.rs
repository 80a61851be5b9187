//! Application configuration
//!
//! Defaults match the web client's behaviour; a TOML file and `COGNISPARK_*`
//! environment variables can override them.

use crate::database::SCHEMA_VERSION;
use crate::error::{CogniError, IntoCogniError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/v1";
const DEFAULT_LANGUAGE: &str = "es-MX";

/// Runtime settings for the store, the sync coordinator and the voice layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL joined with every endpoint (no trailing slash)
    pub api_base_url: String,
    /// SQLite file backing the offline store
    pub database_path: PathBuf,
    /// Target schema version for the offline store
    pub schema_version: u32,
    /// How long to wait on a locked database before reporting it blocked
    pub busy_timeout_ms: u64,
    /// BCP 47 tag used when start_listening gets no language
    pub recognition_language: String,
    /// BCP 47 tag used when speak gets no language
    pub synthesis_language: String,
    /// Consecutive recognition restarts allowed without a result
    pub max_auto_restarts: u32,
    /// Upper bound on a microphone permission request
    pub permission_timeout_ms: u64,
    /// Waveform frame cap
    pub max_fps: u32,
    /// Native frame cadence used by the animation task
    pub refresh_hz: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            database_path: get_database_path()
                .unwrap_or_else(|_| PathBuf::from("./cognispark_offline.db")),
            schema_version: SCHEMA_VERSION,
            busy_timeout_ms: 250,
            recognition_language: DEFAULT_LANGUAGE.to_string(),
            synthesis_language: DEFAULT_LANGUAGE.to_string(),
            max_auto_restarts: 1,
            permission_timeout_ms: 10_000,
            max_fps: 60,
            refresh_hz: 60,
        }
    }
}

impl AppConfig {
    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML settings file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading settings from: {}", path.display());

        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&raw).map_cogni_err(CogniError::Config)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COGNISPARK_API_URL") {
            self.api_base_url = url;
        }
        if let Some(path) = lookup("COGNISPARK_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(lang) = lookup("COGNISPARK_LANG") {
            self.recognition_language = lang.clone();
            self.synthesis_language = lang;
        }
        if let Some(raw) = lookup("COGNISPARK_MAX_RESTARTS") {
            self.max_auto_restarts = raw
                .parse()
                .map_cogni_err(|e| CogniError::Config(format!("COGNISPARK_MAX_RESTARTS: {}", e)))?;
        }
        if let Some(raw) = lookup("COGNISPARK_MAX_FPS") {
            self.max_fps = raw
                .parse()
                .map_cogni_err(|e| CogniError::Config(format!("COGNISPARK_MAX_FPS: {}", e)))?;
        }

        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Reject values the components cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(CogniError::Config(format!(
                "Invalid API base URL: '{}'. Must start with http:// or https://",
                self.api_base_url
            )));
        }

        if !(1..=SCHEMA_VERSION).contains(&self.schema_version) {
            return Err(CogniError::Config(format!(
                "Invalid schema version: {}. Must be between 1 and {}",
                self.schema_version, SCHEMA_VERSION
            )));
        }

        if self.max_fps == 0 || self.refresh_hz == 0 {
            return Err(CogniError::Config(
                "max_fps and refresh_hz must be greater than zero".to_string(),
            ));
        }

        if self.recognition_language.trim().is_empty() || self.synthesis_language.trim().is_empty() {
            return Err(CogniError::Config("Language tags cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Get the path to the offline database file
pub fn get_database_path() -> Result<PathBuf> {
    let mut db_path = dirs::data_local_dir()
        .ok_or_else(|| CogniError::Config("Failed to get local data directory".to_string()))?;

    db_path.push("com.cognispark.client");
    db_path.push("cognispark_offline.db");

    Ok(db_path)
}
