use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Transcriber, Transcript, UNKNOWN_LANGUAGE};
use crate::config::TranscriberConfig;
use crate::error::{JimakuError, Result};
use crate::pipeline::Segment;

// Structs for parsing whisper.cpp JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    #[serde(default)]
    pub result: Option<WhisperCppResult>,
    #[serde(default)]
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: WhisperCppOffsets,
    pub text: String,
}

/// Segment bounds in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

impl WhisperCppOutput {
    /// Convert to a transcript, dropping blank segments and mapping offsets to seconds.
    pub fn into_transcript(self, fallback_language: Option<&str>) -> Transcript {
        let segments: Vec<Segment> = self
            .transcription
            .into_iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .map(|seg| {
                Segment::new(
                    seg.offsets.from.max(0) as f64 / 1000.0,
                    seg.offsets.to.max(0) as f64 / 1000.0,
                    seg.text.trim(),
                )
            })
            .collect();

        let text = segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let language = self
            .result
            .map(|r| r.language)
            .or_else(|| fallback_language.map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        Transcript {
            text,
            segments,
            language,
        }
    }
}

/// Transcriber that shells out to the whisper.cpp CLI
pub struct WhisperCppTranscriber {
    config: TranscriberConfig,
}

impl WhisperCppTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcriber for WhisperCppTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        if !audio_path.is_file() {
            return Err(JimakuError::MediaNotFound(format!(
                "Audio file not found: {}",
                audio_path.display()
            )));
        }

        info!("Transcribing {}", audio_path.display());

        let temp_dir = tempfile::tempdir().map_err(|e| {
            JimakuError::Transcription(format!("Failed to create temp dir: {}", e))
        })?;
        debug!("Using temp directory: {}", temp_dir.path().display());

        let output_base = temp_dir.path().join("transcript");
        let output_path = temp_dir.path().join("transcript.json");

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg("-oj")
            .arg("-of")
            .arg(&output_base)
            .arg("-m")
            .arg(&self.config.model_path)
            .arg("-t")
            .arg(self.config.threads.max(1).to_string())
            .arg("-f")
            .arg(audio_path);

        if let Some(lang) = &self.config.language {
            cmd.arg("-l").arg(lang);
        }

        debug!("Executing whisper command: {:?}", cmd);

        let output = cmd.output().await.map_err(|e| {
            JimakuError::Transcription(format!("Failed to execute whisper: {}", e))
        })?;

        debug!("Whisper exit status: {}", output.status);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JimakuError::Transcription(format!(
                "Whisper failed: {}",
                stderr.trim()
            )));
        }

        let json_content = fs::read_to_string(&output_path).await.map_err(|e| {
            JimakuError::Transcription(format!("Failed to read transcription: {}", e))
        })?;

        let whisper_output: WhisperCppOutput = serde_json::from_str(&json_content).map_err(|e| {
            JimakuError::Transcription(format!("Failed to parse transcription JSON: {}", e))
        })?;

        let transcript = whisper_output.into_transcript(self.config.language.as_deref());
        info!(
            "Transcription finished: {} segments, language {}",
            transcript.segments.len(),
            transcript.language
        );
        Ok(transcript)
    }

    /// Check that the binary runs and the model file exists
    async fn check_availability(&self) -> Result<()> {
        if !self.config.model_path.is_file() {
            return Err(JimakuError::Configuration(format!(
                "Whisper model not found: {}",
                self.config.model_path.display()
            )));
        }

        Command::new(&self.config.binary_path)
            .arg("--help")
            .output()
            .await
            .map_err(|e| {
                JimakuError::Configuration(format!(
                    "Whisper binary '{}' not found: {}",
                    self.config.binary_path, e
                ))
            })?;

        info!("Whisper is available");
        Ok(())
    }
}
