use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{RetryPolicy, generate_with_retry};
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::pipeline::{PipelineState, Stage, StageContext};
use crate::translate::TranslationPrompts;

/// Translates the whole current context in one request
pub struct ContextTranslationStage {
    model: Arc<dyn LanguageModel>,
    prompts: TranslationPrompts,
    policy: RetryPolicy,
}

impl ContextTranslationStage {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: TranslationPrompts, policy: RetryPolicy) -> Self {
        Self {
            model,
            prompts,
            policy,
        }
    }
}

#[async_trait]
impl Stage for ContextTranslationStage {
    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let context = state.context().unwrap_or("").trim();
        if context.is_empty() {
            warn!("No context to translate, keeping state as is");
            return Ok(state);
        }

        info!("Translating context to {}...", self.prompts.target_name());
        let prompt = self.prompts.context_translation_prompt(context);
        let generation = generate_with_retry(self.model.as_ref(), &prompt, self.policy, ctx).await?;
        let translated = generation.text.trim().to_string();
        info!("Context translated ({} characters)", translated.chars().count());

        let metadata = json!({
            "target_language": self.prompts.target_name(),
            "translated_context": translated,
        });
        Ok(state
            .with_context(translated)
            .with_metadata(ctx.name(), metadata))
    }

    async fn after_process(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        Ok(ctx.settle_usage(state))
    }
}
