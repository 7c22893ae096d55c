use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{RetryPolicy, generate_with_retry};
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::pipeline::{PipelineState, Stage, StageContext};
use crate::translate::TranslationPrompts;

/// Replaces the context with a model-written summary of it
pub struct SummarizeStage {
    model: Arc<dyn LanguageModel>,
    prompts: TranslationPrompts,
    policy: RetryPolicy,
}

impl SummarizeStage {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: TranslationPrompts, policy: RetryPolicy) -> Self {
        Self {
            model,
            prompts,
            policy,
        }
    }
}

#[async_trait]
impl Stage for SummarizeStage {
    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let context = state.context().unwrap_or("").trim();
        if context.is_empty() {
            warn!("Nothing to summarize, keeping state as is");
            return Ok(state);
        }

        info!("Creating context summary...");
        let prompt = self.prompts.summary_prompt(context);
        let generation = generate_with_retry(self.model.as_ref(), &prompt, self.policy, ctx).await?;
        let summary = generation.text.trim().to_string();
        info!("Context summary created successfully");

        let metadata = json!({ "summary": summary });
        Ok(state
            .with_context(summary)
            .with_metadata(ctx.name(), metadata))
    }

    async fn after_process(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        Ok(ctx.settle_usage(state))
    }
}
