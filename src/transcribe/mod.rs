// Speech-to-text
//
// - whisper_cpp: whisper.cpp CLI implementation and its JSON output format
//
// To add another engine, implement Transcriber and return its segments in
// seconds; TranscriptionStage does the rest.

pub mod whisper_cpp;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use whisper_cpp::WhisperCppTranscriber;

use crate::config::TranscriberConfig;
use crate::error::Result;
use crate::pipeline::Segment;

/// Language code recorded when the engine reports none and no hint was given
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Result of transcribing one audio file
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<Segment>,
    /// Detected or requested language code
    pub language: String,
}

impl Transcript {
    /// Whether segments are ordered by start time
    pub fn is_ordered(&self) -> bool {
        self.segments.windows(2).all(|w| w[0].start <= w[1].start)
    }
}

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript>;

    /// Check that the engine and its model are usable
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_default(config: TranscriberConfig) -> Arc<dyn Transcriber> {
        Arc::new(WhisperCppTranscriber::new(config))
    }
}
