//! TOML configuration file loading
//!
//! Supports `~/.config/lumen/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LumenConfigFile {
    /// Speech arbiter timing and filtering
    #[serde(default)]
    pub arbiter: ArbiterFileConfig,

    /// Wake-word dispatcher vocabulary and windows
    #[serde(default)]
    pub dispatcher: DispatcherFileConfig,

    /// Dialog-scoped recognition
    #[serde(default)]
    pub dialog: DialogFileConfig,

    /// Intent classifier
    #[serde(default)]
    pub classifier: ClassifierFileConfig,
}

/// Speech arbiter configuration (durations in milliseconds)
#[derive(Debug, Default, Deserialize)]
pub struct ArbiterFileConfig {
    /// Recognition language (e.g. "pt-BR")
    pub language: Option<String>,
    pub min_restart_interval_ms: Option<u64>,
    pub end_debounce_ms: Option<u64>,
    pub auto_restart_delay_ms: Option<u64>,
    pub enable_settle_ms: Option<u64>,
    pub post_speech_settle_ms: Option<u64>,
    pub post_pause_settle_ms: Option<u64>,
    pub transient_restart_delay_ms: Option<u64>,
    pub error_backoff_step_ms: Option<u64>,
    pub max_error_backoff_ms: Option<u64>,
    pub duplicate_window_ms: Option<u64>,
    pub secondary_duplicate_window_ms: Option<u64>,
    pub echo_base_ttl_ms: Option<u64>,
    pub echo_ttl_per_char_ms: Option<u64>,
    pub echo_max_ttl_ms: Option<u64>,
    /// Phrases the app speaks that must never count as user input
    pub prompt_fragments: Option<Vec<String>>,
}

/// Dispatcher configuration (durations in milliseconds)
#[derive(Debug, Default, Deserialize)]
pub struct DispatcherFileConfig {
    pub wake_words: Option<Vec<String>>,
    pub stop_words: Option<Vec<String>>,
    pub back_words: Option<Vec<String>>,
    pub duplicate_transcript_window_ms: Option<u64>,
    pub duplicate_intent_window_ms: Option<u64>,
    pub completion_window_ms: Option<u64>,
}

/// Dialog hook configuration (durations in milliseconds)
#[derive(Debug, Default, Deserialize)]
pub struct DialogFileConfig {
    pub poll_interval_ms: Option<u64>,
    pub commit_window_ms: Option<u64>,
}

/// Classifier configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClassifierFileConfig {
    /// Path to a model JSON file replacing the embedded model
    pub model_path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LumenConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LumenConfigFile {
    let Some(path) = config_file_path() else {
        return LumenConfigFile::default();
    };

    if !path.exists() {
        return LumenConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            LumenConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<LumenConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/lumen/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lumen").join("config.toml"))
}
