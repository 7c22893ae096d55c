use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::media::AudioSource;
use crate::pipeline::{PipelineState, Stage, StageContext};

/// Extracts audio from the state's media reference unless a usable file is already set
pub struct AudioExtractionStage {
    source: Arc<dyn AudioSource>,
}

impl AudioExtractionStage {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self { source }
    }
}

/// True when the state already points at an existing audio file.
pub(crate) fn has_audio(state: &PipelineState) -> bool {
    state.audio_ref().is_some_and(|path| path.is_file())
}

/// Run the audio source and record where the audio landed under `metadata_key`.
pub(crate) async fn extract_into(
    source: &dyn AudioSource,
    state: PipelineState,
    metadata_key: &str,
) -> Result<PipelineState> {
    let audio_path = source.extract_audio(state.media_ref()).await?;
    info!("Audio ready at {}", audio_path.display());

    let metadata = json!({ "audio_ref": audio_path.display().to_string() });
    Ok(state
        .with_audio_ref(audio_path)
        .with_metadata(metadata_key, metadata))
}

#[async_trait]
impl Stage for AudioExtractionStage {
    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        if has_audio(&state) {
            info!("Audio already extracted, skipping");
            return Ok(state);
        }
        extract_into(self.source.as_ref(), state, ctx.name()).await
    }
}
