use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::{Config, WorkflowKind};
use crate::error::{JimakuError, Result};
use crate::llm::{LanguageModel, OllamaModel, check_ollama_availability};
use crate::media::processor::remote_url;
use crate::media::{AudioSource, AudioSourceFactory};
use crate::pipeline::{END, Pipeline, PipelineBuilder, PipelineState};
use crate::stages::{
    AudioExtractionStage, ContextTranslationStage, RetryPolicy, SegmentTranslationStage,
    SummarizeStage, TranscriptionStage,
};
use crate::subtitle;
use crate::transcribe::{Transcriber, TranscriberFactory, UNKNOWN_LANGUAGE};
use crate::translate::{BatchTranslationEngine, TranslationPrompts};

/// Node names used by the built-in workflows
pub mod nodes {
    pub const EXTRACT_AUDIO: &str = "extract_audio";
    pub const TRANSCRIBE: &str = "transcribe";
    pub const SUMMARIZE: &str = "summarize";
    pub const TRANSLATE_CONTEXT: &str = "translate_context";
    pub const TRANSLATE_SEGMENTS: &str = "translate_segments";
}

/// Filename language tag for transcripts whose language was not detected
const UNTAGGED_LANGUAGE: &str = "orig";

const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];

/// External services a workflow's stages talk to
#[derive(Clone)]
pub struct Collaborators {
    pub audio: Arc<dyn AudioSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn LanguageModel>,
}

impl Collaborators {
    /// ffmpeg/yt-dlp, whisper.cpp and Ollama as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            audio: AudioSourceFactory::create_source(config.media.clone()),
            transcriber: TranscriberFactory::create_default(config.transcriber.clone()),
            model: Arc::new(OllamaModel::new(&config.translate)?),
        })
    }
}

/// Wires stages into the named workflows
pub struct WorkflowFactory;

impl WorkflowFactory {
    pub fn build(kind: WorkflowKind, config: &Config, collaborators: &Collaborators) -> Result<Pipeline> {
        use nodes::*;

        let prompts = TranslationPrompts::new(&config.translate.target_language);
        let policy = RetryPolicy::from_config(&config.translate);

        let extract = Arc::new(AudioExtractionStage::new(collaborators.audio.clone()));
        let transcribe = Arc::new(TranscriptionStage::new(
            collaborators.transcriber.clone(),
            collaborators.audio.clone(),
        ));
        let translate_segments = || {
            Arc::new(SegmentTranslationStage::new(BatchTranslationEngine::new(
                collaborators.model.clone(),
                prompts.clone(),
                config.translate.engine_options(config.translate.max_retries),
            )))
        };

        let builder = PipelineBuilder::new()
            .add_stage(EXTRACT_AUDIO, extract)
            .add_stage(TRANSCRIBE, transcribe)
            .add_edge(EXTRACT_AUDIO, TRANSCRIBE);

        let builder = match kind {
            WorkflowKind::Transcribe => builder.add_edge(TRANSCRIBE, END),
            WorkflowKind::Direct => builder
                .add_stage(TRANSLATE_SEGMENTS, translate_segments())
                .add_edge(TRANSCRIBE, TRANSLATE_SEGMENTS)
                .add_edge(TRANSLATE_SEGMENTS, END),
            WorkflowKind::Summarized => builder
                .add_stage(
                    SUMMARIZE,
                    Arc::new(SummarizeStage::new(
                        collaborators.model.clone(),
                        prompts.clone(),
                        policy,
                    )),
                )
                .add_stage(TRANSLATE_SEGMENTS, translate_segments())
                .add_edge(TRANSCRIBE, SUMMARIZE)
                .add_edge(SUMMARIZE, TRANSLATE_SEGMENTS)
                .add_edge(TRANSLATE_SEGMENTS, END),
            WorkflowKind::Full => builder
                .add_stage(
                    SUMMARIZE,
                    Arc::new(SummarizeStage::new(
                        collaborators.model.clone(),
                        prompts.clone(),
                        policy,
                    )),
                )
                .add_stage(
                    TRANSLATE_CONTEXT,
                    Arc::new(ContextTranslationStage::new(
                        collaborators.model.clone(),
                        prompts.clone(),
                        policy,
                    )),
                )
                .add_stage(TRANSLATE_SEGMENTS, translate_segments())
                .add_edge(TRANSCRIBE, SUMMARIZE)
                .add_edge(SUMMARIZE, TRANSLATE_CONTEXT)
                .add_edge(TRANSLATE_CONTEXT, TRANSLATE_SEGMENTS)
                .add_edge(TRANSLATE_SEGMENTS, END),
        };

        builder.build()
    }
}

/// Outcome of a directory run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct Workflow {
    config: Config,
    collaborators: Collaborators,
    pipeline: Pipeline,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let pipeline = WorkflowFactory::build(config.output.workflow, &config, &collaborators)?;
        info!(
            "Workflow '{:?}' ready: {}",
            config.output.workflow,
            pipeline.node_order().join(" → ")
        );

        Ok(Self {
            config,
            collaborators,
            pipeline,
        })
    }

    /// Check the media tools and transcriber, and the language model when the workflow needs one
    pub async fn check_dependencies(&self) -> Result<()> {
        self.collaborators.audio.check_availability().await?;
        self.collaborators.transcriber.check_availability().await?;

        if self.config.output.workflow != WorkflowKind::Transcribe {
            check_ollama_availability(&self.config.translate.endpoint, &self.config.translate.model)
                .await?;
        }
        Ok(())
    }

    /// Run the pipeline for one media reference and write its subtitles.
    /// Nothing is written unless every stage succeeded.
    pub async fn process_single_file(&self, media_ref: &str, output_dir: Option<&Path>) -> Result<PathBuf> {
        info!("Processing: {}", media_ref);

        let output_dir = self.resolve_output_dir(media_ref, output_dir);
        let state = self.pipeline.execute(PipelineState::new(media_ref)).await?;

        let language = self.subtitle_language(&state);
        let srt_path = output_dir.join(format!("{}_{}.srt", media_stem(media_ref), language));
        subtitle::write(state.segments(), &srt_path).await?;

        let total = state.total_token_usage();
        info!(
            "Completed {} ({} input tokens, {} output tokens)",
            srt_path.display(),
            total.input_tokens,
            total.output_tokens
        );
        Ok(srt_path)
    }

    /// Process every video file below `input_dir`. Fails if any file failed.
    pub async fn process_directory(&self, input_dir: &Path, output_dir: Option<&Path>) -> Result<BatchReport> {
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(JimakuError::Configuration(format!(
                "Input path is not a directory: {}",
                input_dir.display()
            )));
        }

        let video_files = find_video_files(input_dir);
        info!("Found {} video files to process", video_files.len());

        let mut report = BatchReport::default();
        for video_path in video_files {
            let media_ref = video_path.to_string_lossy().to_string();
            match self.process_single_file(&media_ref, output_dir).await {
                Ok(srt_path) => {
                    info!("Successfully processed: {}", video_path.display());
                    report.written.push(srt_path);
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", video_path.display(), e);
                    report.failed.push((video_path, e.to_string()));
                }
            }
        }

        if !report.failed.is_empty() {
            error!(
                "{} of {} files failed",
                report.failed.len(),
                report.failed.len() + report.written.len()
            );
            return Err(JimakuError::Translation(format!(
                "{} file(s) failed to process, first: {}",
                report.failed.len(),
                report.failed[0].0.display()
            )));
        }

        Ok(report)
    }

    /// Extract audio only and copy it to `output`
    pub async fn extract_audio(&self, media_ref: &str, output: &Path) -> Result<()> {
        let audio_path = self.collaborators.audio.extract_audio(media_ref).await?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&audio_path, output).await?;
        info!("Audio written to {}", output.display());
        Ok(())
    }

    /// Extract and transcribe, writing source-language subtitles to `output`
    pub async fn transcribe(&self, media_ref: &str, output: &Path) -> Result<()> {
        let pipeline = WorkflowFactory::build(WorkflowKind::Transcribe, &self.config, &self.collaborators)?;
        let state = pipeline.execute(PipelineState::new(media_ref)).await?;
        subtitle::write(state.segments(), output).await
    }

    fn resolve_output_dir(&self, media_ref: &str, output_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = output_dir.or(self.config.output.directory.as_deref()) {
            return dir.to_path_buf();
        }
        if remote_url(media_ref).is_some() {
            return PathBuf::from(".");
        }
        Path::new(media_ref)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Target language, or the transcript's language for transcription-only runs
    fn subtitle_language(&self, state: &PipelineState) -> String {
        if self.config.output.workflow != WorkflowKind::Transcribe {
            return self.config.translate.target_language.clone();
        }
        state
            .metadata()
            .get(nodes::TRANSCRIBE)
            .and_then(|m| m.get("language"))
            .and_then(|l| l.as_str())
            .filter(|l| !l.is_empty() && *l != UNKNOWN_LANGUAGE)
            .unwrap_or(UNTAGGED_LANGUAGE)
            .to_string()
    }
}

/// File stem for local paths; video id or last path segment for URLs.
pub fn media_stem(media_ref: &str) -> String {
    if let Some(url) = remote_url(media_ref) {
        if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
            return id.to_string();
        }
        return url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
            .map(|segment| {
                Path::new(&segment)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or(segment)
            })
            .unwrap_or_else(|| "download".to_string());
    }

    Path::new(media_ref)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string())
}

fn find_video_files(input_dir: &Path) -> Vec<PathBuf> {
    let mut video_files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .map(|entry| entry.into_path())
        .collect();
    video_files.sort();
    video_files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Generation;
    use crate::media::MockAudioSource;
    use crate::pipeline::{Segment, TokenUsage};
    use crate::stages::testing::CannedModel;
    use crate::transcribe::{MockTranscriber, Transcript};
    use assert_fs::prelude::*;

    fn config(kind: WorkflowKind) -> Config {
        let mut config = Config::default();
        config.output.workflow = kind;
        config.translate.retry_backoff_ms = 0;
        config
    }

    /// Audio source that "extracts" to a real temp file so transcription accepts it
    fn audio_source(audio: PathBuf) -> MockAudioSource {
        let mut source = MockAudioSource::new();
        source
            .expect_extract_audio()
            .returning(move |_| Ok(audio.clone()));
        source
    }

    fn transcriber() -> MockTranscriber {
        transcriber_reporting("en")
    }

    fn transcriber_reporting(language: &'static str) -> MockTranscriber {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().returning(move |_| {
            Ok(Transcript {
                text: "Hello. Goodbye.".to_string(),
                segments: vec![
                    Segment::new(0.0, 1.5, "Hello."),
                    Segment::new(1.2, 3.0, "Goodbye."),
                ],
                language: language.to_string(),
            })
        });
        transcriber
    }

    fn collaborators(audio: PathBuf, model: Arc<CannedModel>) -> Collaborators {
        Collaborators {
            audio: Arc::new(audio_source(audio)),
            transcriber: Arc::new(transcriber()),
            model,
        }
    }

    #[test]
    fn test_workflow_node_orders() {
        let model = Arc::new(CannedModel::new(Vec::new()));
        let collab = collaborators(PathBuf::from("a.wav"), model);
        let expected: [(WorkflowKind, &[&str]); 4] = [
            (WorkflowKind::Transcribe, &["extract_audio", "transcribe"]),
            (
                WorkflowKind::Direct,
                &["extract_audio", "transcribe", "translate_segments"],
            ),
            (
                WorkflowKind::Summarized,
                &["extract_audio", "transcribe", "summarize", "translate_segments"],
            ),
            (
                WorkflowKind::Full,
                &[
                    "extract_audio",
                    "transcribe",
                    "summarize",
                    "translate_context",
                    "translate_segments",
                ],
            ),
        ];

        for (kind, order) in expected {
            let pipeline = WorkflowFactory::build(kind, &config(kind), &collab).unwrap();
            assert_eq!(pipeline.node_order(), order);
        }
    }

    #[test]
    fn test_media_stem() {
        assert_eq!(media_stem("videos/lecture 01.mp4"), "lecture 01");
        assert_eq!(media_stem("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(media_stem("https://example.com/media/talk.webm"), "talk");
        assert_eq!(media_stem("https://example.com/"), "download");
    }

    #[tokio::test]
    async fn test_summarized_run_writes_translated_srt() {
        let temp = assert_fs::TempDir::new().unwrap();
        let audio = temp.child("cache/talk.wav");
        audio.write_binary(b"RIFF").unwrap();

        let model = Arc::new(CannedModel::new(vec![
            Ok(Generation::new("A short farewell.", Some(TokenUsage::new(20, 4)))),
            Ok(Generation::new("สวัสดี\n[SSS]\nลาก่อน", Some(TokenUsage::new(60, 8)))),
        ]));
        let workflow = Workflow::with_collaborators(
            config(WorkflowKind::Summarized),
            collaborators(audio.to_path_buf(), model.clone()),
        )
        .unwrap();

        let out_dir = temp.child("out");
        let srt = workflow
            .process_single_file("talk.mp4", Some(out_dir.path()))
            .await
            .unwrap();

        assert_eq!(srt, out_dir.path().join("talk_th.srt"));
        out_dir.child("talk_th.srt").assert(
            "1\n00:00:00,000 --> 00:00:01,500\nสวัสดี\n\n2\n00:00:01,500 --> 00:00:03,000\nลาก่อน\n",
        );
        assert_eq!(model.calls(), 2);
        assert!(model.prompts.lock().unwrap()[1].contains("A short farewell."));
    }

    #[tokio::test]
    async fn test_failed_translation_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let audio = temp.child("talk.wav");
        audio.write_binary(b"RIFF").unwrap();

        let mut config = config(WorkflowKind::Direct);
        config.translate.max_retries = 2;
        let model = Arc::new(CannedModel::new(vec![
            Ok(Generation::new("one", None)),
            Ok(Generation::new("one", None)),
        ]));
        let workflow =
            Workflow::with_collaborators(config, collaborators(audio.to_path_buf(), model)).unwrap();

        let out_dir = temp.child("out");
        let err = workflow
            .process_single_file("talk.mp4", Some(out_dir.path()))
            .await
            .unwrap_err();

        match err {
            JimakuError::Stage { stage, source } => {
                assert_eq!(stage, "translate_segments");
                assert!(matches!(*source, JimakuError::BatchFailed { batch: 1, attempts: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out_dir.child("talk_th.srt").path().exists());
    }

    #[tokio::test]
    async fn test_transcribe_only_uses_source_language() {
        let temp = assert_fs::TempDir::new().unwrap();
        let audio = temp.child("talk.wav");
        audio.write_binary(b"RIFF").unwrap();

        let model = Arc::new(CannedModel::new(Vec::new()));
        let workflow = Workflow::with_collaborators(
            config(WorkflowKind::Transcribe),
            collaborators(audio.to_path_buf(), model.clone()),
        )
        .unwrap();

        let srt = workflow
            .process_single_file("clips/talk.mp4", Some(temp.path()))
            .await
            .unwrap();

        assert_eq!(srt, temp.path().join("talk_en.srt"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_transcribe_only_without_detected_language_is_tagged_orig() {
        let temp = assert_fs::TempDir::new().unwrap();
        let audio = temp.child("talk.wav");
        audio.write_binary(b"RIFF").unwrap();

        let collab = Collaborators {
            audio: Arc::new(audio_source(audio.to_path_buf())),
            transcriber: Arc::new(transcriber_reporting(UNKNOWN_LANGUAGE)),
            model: Arc::new(CannedModel::new(Vec::new())),
        };
        let workflow = Workflow::with_collaborators(config(WorkflowKind::Transcribe), collab).unwrap();

        let srt = workflow
            .process_single_file("talk.mp4", Some(temp.path()))
            .await
            .unwrap();

        assert_eq!(srt, temp.path().join("talk_orig.srt"));
        assert!(srt.is_file());
    }

    #[tokio::test]
    async fn test_dependency_check_covers_media_and_transcriber() {
        let mut audio = MockAudioSource::new();
        audio.expect_check_availability().times(1).returning(|| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_check_availability().times(1).returning(|| Ok(()));

        let collab = Collaborators {
            audio: Arc::new(audio),
            transcriber: Arc::new(transcriber),
            model: Arc::new(CannedModel::new(Vec::new())),
        };
        let workflow = Workflow::with_collaborators(config(WorkflowKind::Transcribe), collab).unwrap();

        workflow.check_dependencies().await.unwrap();
    }

    #[tokio::test]
    async fn test_dependency_check_stops_at_missing_ffmpeg() {
        let mut audio = MockAudioSource::new();
        audio
            .expect_check_availability()
            .returning(|| Err(JimakuError::Media("ffmpeg not available".to_string())));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_check_availability().never();

        let collab = Collaborators {
            audio: Arc::new(audio),
            transcriber: Arc::new(transcriber),
            model: Arc::new(CannedModel::new(Vec::new())),
        };
        let workflow = Workflow::with_collaborators(config(WorkflowKind::Direct), collab).unwrap();

        let err = workflow.check_dependencies().await.unwrap_err();
        assert!(matches!(err, JimakuError::Media(_)));
    }

    #[tokio::test]
    async fn test_directory_run_reports_each_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let audio = temp.child("cache/audio.wav");
        audio.write_binary(b"RIFF").unwrap();
        let videos = temp.child("videos");
        videos.child("a.mp4").write_binary(b"video").unwrap();
        videos.child("nested/b.MKV").write_binary(b"video").unwrap();
        videos.child("notes.txt").write_str("skip me").unwrap();

        let model = Arc::new(CannedModel::new(Vec::new()));
        let workflow = Workflow::with_collaborators(
            config(WorkflowKind::Transcribe),
            collaborators(audio.to_path_buf(), model),
        )
        .unwrap();

        let out_dir = temp.child("out");
        let report = workflow
            .process_directory(videos.path(), Some(out_dir.path()))
            .await
            .unwrap();

        assert_eq!(report.written.len(), 2);
        assert!(report.failed.is_empty());
        assert!(out_dir.child("a_en.srt").path().is_file());
        assert!(out_dir.child("b_en.srt").path().is_file());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = config(WorkflowKind::Direct);
        config.translate.batch_size = 0;
        let model = Arc::new(CannedModel::new(Vec::new()));

        let result = Workflow::with_collaborators(config, collaborators(PathBuf::from("a.wav"), model));
        assert!(matches!(result, Err(JimakuError::Configuration(_))));
    }
}
