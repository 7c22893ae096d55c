use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::{AudioSource, MediaCommandBuilder};
use crate::config::MediaConfig;
use crate::error::{JimakuError, Result};

/// Audio source backed by ffmpeg for local files and yt-dlp for URLs
pub struct FfmpegAudioSource {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegAudioSource {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.ffmpeg_path, &config.downloader_path);

        Self {
            config,
            command_builder,
        }
    }

    async fn prepare_work_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        Ok(())
    }

    async fn extract_from_file(&self, video_path: &Path) -> Result<PathBuf> {
        if !video_path.is_file() {
            return Err(JimakuError::MediaNotFound(format!(
                "Media file not found: {}",
                video_path.display()
            )));
        }

        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let audio_path = self.config.work_dir.join(format!("{}.wav", stem));

        info!(
            "Extracting audio from {} to {}",
            video_path.display(),
            audio_path.display()
        );
        self.command_builder
            .extract_audio(video_path, &audio_path)
            .execute()
            .await?;

        ensure_output(&audio_path, &video_path.display().to_string())?;
        info!("Audio extraction completed");
        Ok(audio_path)
    }

    async fn download(&self, url: &Url) -> Result<PathBuf> {
        let template = self.config.work_dir.join(Uuid::new_v4().to_string());
        let audio_path = template.with_extension("wav");

        info!("Downloading audio from {}", url);
        self.command_builder
            .download_audio(url.as_str(), &template)
            .execute()
            .await
            .map_err(|e| match e {
                JimakuError::Media(msg) => {
                    JimakuError::MediaNotFound(format!("Could not download {}: {}", url, msg))
                }
                other => other,
            })?;

        ensure_output(&audio_path, url.as_str())?;
        info!("Downloaded audio saved to {}", audio_path.display());
        Ok(audio_path)
    }
}

#[async_trait]
impl AudioSource for FfmpegAudioSource {
    async fn extract_audio(&self, media_ref: &str) -> Result<PathBuf> {
        self.prepare_work_dir().await?;

        match remote_url(media_ref) {
            Some(url) => self.download(&url).await,
            None => self.extract_from_file(Path::new(media_ref)).await,
        }
    }

    /// yt-dlp is only needed for URLs, so only ffmpeg is required up front
    async fn check_availability(&self) -> Result<()> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| JimakuError::Media(format!("ffmpeg not available: {}", e)))?;
        info!("ffmpeg is available");
        Ok(())
    }
}

/// Parse `media_ref` as an http(s) URL; anything else is treated as a path.
pub fn remote_url(media_ref: &str) -> Option<Url> {
    let url = Url::parse(media_ref).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn ensure_output(audio_path: &Path, source: &str) -> Result<()> {
    debug!("Checking extracted audio at {}", audio_path.display());
    if audio_path.is_file() {
        Ok(())
    } else {
        Err(JimakuError::MediaNotFound(format!(
            "Expected audio file {} was not produced for {}",
            audio_path.display(),
            source
        )))
    }
}
