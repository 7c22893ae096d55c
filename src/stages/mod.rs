// Concrete pipeline stages
//
// - audio: media reference to extracted audio
// - transcription: audio to timed segments and full transcript
// - summarize: transcript summary used as translation hint
// - context_translation: whole-context translation
// - segment_translation: batched segment translation through the engine

pub mod audio;
pub mod context_translation;
pub mod segment_translation;
pub mod summarize;
pub mod transcription;

use std::time::Duration;
use tracing::{error, warn};

pub use audio::AudioExtractionStage;
pub use context_translation::ContextTranslationStage;
pub use segment_translation::SegmentTranslationStage;
pub use summarize::SummarizeStage;
pub use transcription::TranscriptionStage;

use crate::config::TranslateConfig;
use crate::error::{JimakuError, Result};
use crate::llm::{Generation, LanguageModel};
use crate::pipeline::StageContext;

/// Attempt budget for stages that make a single model call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TranslateConfig) -> Self {
        Self {
            max_retries: config.summary_max_retries.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Call the model until it answers or the policy is exhausted; usage is
/// charged to the stage's ledger entry.
pub(crate) async fn generate_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    policy: RetryPolicy,
    ctx: &StageContext,
) -> Result<Generation> {
    let max_retries = policy.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match model.generate(prompt).await {
            Ok(generation) => {
                ctx.ledger().record(ctx.name(), generation.usage_or_zero());
                return Ok(generation);
            }
            Err(e) if attempt < max_retries => {
                warn!(
                    "[{}] Attempt {} failed: {}. Retrying...",
                    ctx.name(),
                    attempt,
                    e
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                error!("[{}] Failed after {} attempts", ctx.name(), max_retries);
                return Err(JimakuError::Translation(format!(
                    "{} failed after {} attempts: {}",
                    ctx.name(),
                    max_retries,
                    e
                )));
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CannedModel;
    use super::*;
    use std::sync::Arc;

    use crate::pipeline::{TokenUsage, TokenUsageLedger};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_retry_until_answer() {
        let model = CannedModel::new(vec![
            Err(JimakuError::Transport("timeout".to_string())),
            Ok(Generation::new("summary", Some(TokenUsage::new(100, 20)))),
        ]);
        let ledger = Arc::new(TokenUsageLedger::new());
        let ctx = StageContext::new("summarize", ledger.clone());

        let generation = generate_with_retry(&model, "prompt", policy(3), &ctx)
            .await
            .unwrap();

        assert_eq!(generation.text, "summary");
        assert_eq!(model.calls(), 2);
        assert_eq!(ledger.usage_for("summarize"), TokenUsage::new(100, 20));
    }

    #[tokio::test]
    async fn test_exhausted_policy_names_stage() {
        let model = CannedModel::new(vec![
            Err(JimakuError::Transport("down".to_string())),
            Err(JimakuError::Transport("down".to_string())),
        ]);
        let ctx = StageContext::new("summarize", Arc::new(TokenUsageLedger::new()));

        let err = generate_with_retry(&model, "prompt", policy(2), &ctx)
            .await
            .unwrap_err();

        assert_eq!(model.calls(), 2);
        assert!(err.to_string().contains("summarize failed after 2 attempts"));
    }

    #[test]
    fn test_policy_floors_retries() {
        let config = TranslateConfig {
            summary_max_retries: 0,
            retry_backoff_ms: 250,
            ..TranslateConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }
}
