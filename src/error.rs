use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JimakuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Language model transport error: {0}")]
    Transport(String),

    #[error(
        "Batch {batch} returned {actual} segments on attempt {attempt}, expected {expected}"
    )]
    Validation {
        batch: usize,
        attempt: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Batch {batch} failed after {attempts} attempts: {source}")]
    BatchFailed {
        batch: usize,
        attempts: u32,
        #[source]
        source: Box<JimakuError>,
    },

    #[error("Failed to write subtitles to {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<JimakuError>,
    },
}

pub type Result<T> = std::result::Result<T, JimakuError>;
