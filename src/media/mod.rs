// Audio acquisition
//
// - commands: ffmpeg / yt-dlp command building and execution
// - processor: the AudioSource implementation backed by those tools

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub use commands::{MediaCommand, MediaCommandBuilder};
pub use processor::FfmpegAudioSource;

use crate::config::MediaConfig;
use crate::error::Result;

/// Turns a media reference (local path or URL) into a whisper-ready audio file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn extract_audio(&self, media_ref: &str) -> Result<PathBuf>;

    /// Check that the external tools this source shells out to can run
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating audio source instances
pub struct AudioSourceFactory;

impl AudioSourceFactory {
    /// Create the default audio source (ffmpeg + yt-dlp)
    pub fn create_source(config: MediaConfig) -> Arc<dyn AudioSource> {
        Arc::new(FfmpegAudioSource::new(config))
    }
}
