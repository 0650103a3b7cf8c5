//! Error types for the Lumen voice engine

use thiserror::Error;

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Intent model could not be loaded or is inconsistent
    #[error("model error: {0}")]
    Model(String),

    /// Microphone permission missing or revoked
    #[error("permission error: {0}")]
    Permission(String),

    /// Native speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Native speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Screen action callback failed or is not available
    #[error("action error: {0}")]
    Action(String),

    /// Navigation collaborator error
    #[error("navigation error: {0}")]
    Navigation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
