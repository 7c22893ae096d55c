use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{JimakuError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub media: MediaConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Path to transcriber binary (e.g., whisper-cli)
    pub binary_path: String,
    /// ggml model file passed to whisper.cpp
    pub model_path: PathBuf,
    /// Source language hint; whisper auto-detects when absent
    pub language: Option<String>,
    /// Worker threads for whisper.cpp
    pub threads: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    /// Sampling temperature forwarded to the model
    pub temperature: f32,
    /// Language code subtitles are translated into
    pub target_language: String,
    /// Segments per translation request
    pub batch_size: usize,
    /// Batches allowed in flight at once (0 is treated as 1)
    pub max_concurrency: usize,
    /// Attempts per segment batch
    pub max_retries: u32,
    /// Attempts for single-shot stages (summary, context translation)
    pub summary_max_retries: u32,
    /// Fixed delay between attempts, in milliseconds
    pub retry_backoff_ms: u64,
    /// Charge token usage of responses that failed validation
    pub count_failed_attempt_usage: bool,
    /// HTTP timeout for a single generation request
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to the downloader used for streaming URLs
    pub downloader_path: String,
    /// Directory extracted audio is written to
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where subtitle files go; defaults to the input's directory
    pub directory: Option<PathBuf>,
    /// Which stage chain to run
    pub workflow: WorkflowKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Extract audio and transcribe only
    Transcribe,
    /// Transcribe, then translate segments without a summary
    Direct,
    /// Transcribe, summarize, then translate segments with the summary as context
    #[default]
    Summarized,
    /// Transcribe, summarize, translate the summary, then translate segments
    Full,
}

impl FromStr for WorkflowKind {
    type Err = JimakuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "transcribe" => Ok(WorkflowKind::Transcribe),
            "direct" => Ok(WorkflowKind::Direct),
            "summarized" => Ok(WorkflowKind::Summarized),
            "full" => Ok(WorkflowKind::Full),
            _ => Err(JimakuError::Configuration(format!(
                "Invalid workflow '{}'. Valid workflows: transcribe, direct, summarized, full",
                s
            ))),
        }
    }
}

/// Resolved knobs for the batch translation engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub count_failed_attempt_usage: bool,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper-cli".to_string(),
            model_path: PathBuf::from(".jimaku/models/ggml-base.bin"),
            language: None,
            threads: 4,
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: 0.0,
            target_language: "th".to_string(),
            batch_size: 10,
            max_concurrency: 1,
            max_retries: 5,
            summary_max_retries: 3,
            retry_backoff_ms: 2000,
            count_failed_attempt_usage: true,
            request_timeout_secs: 300,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            downloader_path: "yt-dlp".to_string(),
            work_dir: PathBuf::from(".jimaku/cache/audio"),
        }
    }
}

impl TranslateConfig {
    /// Engine options with the given attempt budget; concurrency is floored at one.
    pub fn engine_options(&self, max_retries: u32) -> EngineOptions {
        EngineOptions {
            batch_size: self.batch_size.max(1),
            max_concurrency: self.max_concurrency.max(1),
            max_retries: max_retries.max(1),
            retry_backoff: self.retry_backoff(),
            count_failed_attempt_usage: self.count_failed_attempt_usage,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JimakuError::Configuration(format!("Failed to read config file: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| JimakuError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| JimakuError::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Explicit path first, then `config.toml` in the working directory, then defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new("config.toml");
                if local.exists() {
                    info!("Found config.toml in current directory, loading...");
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.translate.batch_size == 0 {
            return Err(JimakuError::Configuration(
                "translate.batch_size must be at least 1".to_string(),
            ));
        }
        if self.translate.max_retries == 0 || self.translate.summary_max_retries == 0 {
            return Err(JimakuError::Configuration(
                "retry budgets must be at least 1".to_string(),
            ));
        }
        if self.translate.model.trim().is_empty() {
            return Err(JimakuError::Configuration("translate.model is not set".to_string()));
        }
        if self.translate.endpoint.trim().is_empty() {
            return Err(JimakuError::Configuration("translate.endpoint is not set".to_string()));
        }
        if self.translate.target_language.trim().is_empty() {
            return Err(JimakuError::Configuration(
                "translate.target_language is not set".to_string(),
            ));
        }
        Ok(())
    }
}
