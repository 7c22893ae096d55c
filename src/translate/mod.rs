// Batched segment translation
//
// - batch: partitioning and delimiter handling
// - prompt: prompt templates per target language
// - this module: the engine that runs batches concurrently with retries

pub mod batch;
pub mod prompt;

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub use batch::{Batch, DELIMITER, DELIMITER_TOKEN, join_texts, partition, split_response};
pub use prompt::{TranslationPrompts, language_code_to_name};

use crate::config::EngineOptions;
use crate::error::{JimakuError, Result};
use crate::llm::LanguageModel;
use crate::pipeline::{Segment, TokenUsageLedger};

/// Owned copy of one batch, ready to move into a task
struct BatchJob {
    index: usize,
    segments: Vec<Segment>,
    prompt: String,
    retry_prompt: String,
}

/// Shared by every batch task of one `translate` call
struct BatchRunner {
    model: Arc<dyn LanguageModel>,
    options: EngineOptions,
    ledger: Arc<TokenUsageLedger>,
    stage: String,
}

/// Translates segment lists through a language model in bounded-concurrency batches
///
/// Batches are validated on cardinality, retried with a fixed backoff, and
/// reassembled in batch order. One batch running out of attempts fails the
/// whole call and aborts its siblings.
pub struct BatchTranslationEngine {
    model: Arc<dyn LanguageModel>,
    prompts: TranslationPrompts,
    options: EngineOptions,
}

impl BatchTranslationEngine {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: TranslationPrompts, options: EngineOptions) -> Self {
        Self {
            model,
            prompts,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Translate `segments`, charging model usage to `stage` in `ledger`.
    ///
    /// The result has the input's length and timing; only text changes.
    pub async fn translate(
        &self,
        segments: &[Segment],
        context_hint: Option<&str>,
        ledger: &Arc<TokenUsageLedger>,
        stage: &str,
    ) -> Result<Vec<Segment>> {
        if segments.is_empty() {
            info!("No segments to translate");
            return Ok(Vec::new());
        }

        let jobs = self.prepare_jobs(segments, context_hint);
        let batch_count = jobs.len();
        let max_concurrency = self.options.max_concurrency.max(1);

        info!(
            "Processing {} batches with max {} concurrent tasks",
            batch_count, max_concurrency
        );

        let runner = Arc::new(BatchRunner {
            model: self.model.clone(),
            options: self.options.clone(),
            ledger: ledger.clone(),
            stage: stage.to_string(),
        });
        let semaphore = Arc::new(Semaphore::new(max_concurrency));

        let mut tasks = JoinSet::new();
        for job in jobs {
            let runner = runner.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let index = job.index;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(JimakuError::Translation("Batch scheduler closed".to_string())),
                        );
                    }
                };
                (index, runner.run(job).await)
            });
        }

        let mut results: Vec<Option<Vec<Segment>>> = vec![None; batch_count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(translated))) => {
                    results[index - 1] = Some(translated);
                }
                Ok((index, Err(e))) => {
                    error!("[Batch {}] Aborting translation: {}", index, e);
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(JimakuError::Translation(format!("Batch task failed: {}", e)));
                }
            }
        }

        let mut translated = Vec::with_capacity(segments.len());
        for (i, result) in results.into_iter().enumerate() {
            let batch = result.ok_or_else(|| {
                JimakuError::Translation(format!("Batch {} produced no result", i + 1))
            })?;
            translated.extend(batch);
        }

        info!("Translation of {} segments completed", translated.len());
        Ok(translated)
    }

    fn prepare_jobs(&self, segments: &[Segment], context_hint: Option<&str>) -> Vec<BatchJob> {
        partition(segments, self.options.batch_size)
            .into_iter()
            .map(|batch| {
                let (joined, escaped) = join_texts(batch.segments);
                if escaped > 0 {
                    warn!(
                        "[Batch {}] Escaped delimiter token in {} source segment(s)",
                        batch.index, escaped
                    );
                }
                let prompt = self.prompts.batch_prompt(&joined, context_hint);
                let retry_prompt = self.prompts.retry_prompt(&prompt, batch.len());

                BatchJob {
                    index: batch.index,
                    segments: batch.segments.to_vec(),
                    prompt,
                    retry_prompt,
                }
            })
            .collect()
    }
}

impl BatchRunner {
    async fn run(&self, job: BatchJob) -> Result<Vec<Segment>> {
        let max_retries = self.options.max_retries.max(1);
        info!(
            "[Batch {}] Starting processing ({} segments)",
            job.index,
            job.segments.len()
        );

        let mut last_error = None;
        for attempt in 1..=max_retries {
            let prompt = if attempt == 1 {
                &job.prompt
            } else {
                &job.retry_prompt
            };

            info!(
                "[Batch {}] Sending request to LLM (attempt {}/{})",
                job.index, attempt, max_retries
            );

            match self.attempt(&job, prompt, attempt).await {
                Ok(texts) => {
                    info!("[Batch {}] Successfully processed all segments", job.index);
                    return Ok(job
                        .segments
                        .iter()
                        .zip(texts)
                        .map(|(segment, text)| segment.with_text(text))
                        .collect());
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!("[Batch {}] Attempt {} failed: {}. Retrying...", job.index, attempt, e);
                        tokio::time::sleep(self.options.retry_backoff).await;
                    } else {
                        error!("[Batch {}] Failed after {} attempts: {}", job.index, max_retries, e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(JimakuError::BatchFailed {
            batch: job.index,
            attempts: max_retries,
            source: Box::new(last_error.unwrap_or_else(|| {
                JimakuError::Translation("No attempt was made".to_string())
            })),
        })
    }

    async fn attempt(&self, job: &BatchJob, prompt: &str, attempt: u32) -> Result<Vec<String>> {
        let generation = self.model.generate(prompt).await?;
        let expected = job.segments.len();
        let texts = split_response(&generation.text, expected);

        if texts.len() != expected {
            if self.options.count_failed_attempt_usage {
                self.ledger.record(&self.stage, generation.usage_or_zero());
            }
            return Err(JimakuError::Validation {
                batch: job.index,
                attempt,
                expected,
                actual: texts.len(),
            });
        }

        self.ledger.record(&self.stage, generation.usage_or_zero());
        Ok(texts)
    }
}
