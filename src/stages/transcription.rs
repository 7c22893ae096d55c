use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::audio::{extract_into, has_audio};
use crate::error::{JimakuError, Result};
use crate::media::AudioSource;
use crate::pipeline::{PipelineState, Stage, StageContext};
use crate::transcribe::Transcriber;

/// Transcribes the state's audio into segments and sets the transcript as context
///
/// Extracts audio first when the state has none, so the stage can also be a
/// pipeline entry point.
pub struct TranscriptionStage {
    transcriber: Arc<dyn Transcriber>,
    audio_source: Arc<dyn AudioSource>,
}

impl TranscriptionStage {
    pub fn new(transcriber: Arc<dyn Transcriber>, audio_source: Arc<dyn AudioSource>) -> Self {
        Self {
            transcriber,
            audio_source,
        }
    }
}

#[async_trait]
impl Stage for TranscriptionStage {
    async fn before_process(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        if has_audio(&state) {
            return Ok(state);
        }
        info!("No audio file found, extracting before transcription");
        let key = format!("{}.audio", ctx.name());
        extract_into(self.audio_source.as_ref(), state, &key).await
    }

    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let audio_path = state
            .audio_ref()
            .ok_or_else(|| JimakuError::Transcription("No audio to transcribe".to_string()))?
            .to_path_buf();

        let mut transcript = self.transcriber.transcribe(&audio_path).await?;

        if !transcript.is_ordered() {
            warn!("Transcriber returned segments out of order, sorting by start time");
            transcript
                .segments
                .sort_by(|a, b| a.start.total_cmp(&b.start));
        }

        info!(
            "Transcription completed ({} segments, {} characters)",
            transcript.segments.len(),
            transcript.text.chars().count()
        );

        let metadata = json!({
            "text": transcript.text,
            "language": transcript.language,
            "segments": transcript.segments,
        });

        Ok(state
            .with_context(transcript.text)
            .with_segments(transcript.segments)
            .with_metadata(ctx.name(), metadata))
    }
}
