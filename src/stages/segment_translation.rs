use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::pipeline::{PipelineState, Stage, StageContext};
use crate::translate::BatchTranslationEngine;

/// Translates every segment through the batch engine, using the context as a hint
pub struct SegmentTranslationStage {
    engine: BatchTranslationEngine,
}

impl SegmentTranslationStage {
    pub fn new(engine: BatchTranslationEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage for SegmentTranslationStage {
    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let segment_count = state.segments().len();
        info!("Translating {} segments", segment_count);

        let translated = self
            .engine
            .translate(state.segments(), state.context(), ctx.ledger(), ctx.name())
            .await?;

        let joined = translated
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let batch_size = self.engine.options().batch_size.max(1);

        let metadata = json!({
            "batches": segment_count.div_ceil(batch_size),
            "segments": translated.len(),
        });

        Ok(state
            .with_context(joined)
            .with_segments(translated)
            .with_metadata(ctx.name(), metadata))
    }

    async fn after_process(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        Ok(ctx.settle_usage(state))
    }
}
