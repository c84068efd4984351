//! Error types for HearSay.

use thiserror::Error;

/// Library-level error type for HearSay operations.
#[derive(Error, Debug)]
pub enum HearsayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid YouTube reference: {0}")]
    InvalidReference(String),

    #[error("YouTube asked for human verification: {0}")]
    HumanVerificationRequired(String),

    #[error("Audio acquisition failed: {0}")]
    Acquisition(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Audio transcode failed: {0}")]
    Transcode(String),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),

    #[error("Translation provider error: {0}")]
    Provider(String),

    #[error("Translation failed after {attempts} attempts")]
    TranslationExhausted { attempts: u32 },

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for HearSay operations.
pub type Result<T> = std::result::Result<T, HearsayError>;
