use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::usage::TokenUsage;

/// A timestamped unit of transcript or caption text, offsets in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new<S: Into<String>>(start: f64, end: f64, text: S) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Same timing, different text.
    pub fn with_text<S: Into<String>>(&self, text: S) -> Self {
        Self {
            start: self.start,
            end: self.end,
            text: text.into(),
        }
    }
}

/// Record threaded through every stage of a run.
///
/// Stages take the state by value and hand back a new one. Segments and
/// metadata sit behind `Arc`, so a stage that leaves them alone shares them
/// with its input and a stage that changes them gets a private copy.
#[derive(Debug, Clone)]
pub struct PipelineState {
    media_ref: String,
    audio_ref: Option<PathBuf>,
    context: Option<String>,
    segments: Arc<Vec<Segment>>,
    metadata: Arc<BTreeMap<String, Value>>,
    token_usage: BTreeMap<String, TokenUsage>,
}

impl PipelineState {
    pub fn new<S: Into<String>>(media_ref: S) -> Self {
        Self {
            media_ref: media_ref.into(),
            audio_ref: None,
            context: None,
            segments: Arc::new(Vec::new()),
            metadata: Arc::new(BTreeMap::new()),
            token_usage: BTreeMap::new(),
        }
    }

    pub fn media_ref(&self) -> &str {
        &self.media_ref
    }

    pub fn audio_ref(&self) -> Option<&Path> {
        self.audio_ref.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn token_usage(&self) -> &BTreeMap<String, TokenUsage> {
        &self.token_usage
    }

    pub fn total_token_usage(&self) -> TokenUsage {
        self.token_usage
            .values()
            .fold(TokenUsage::default(), |acc, usage| acc + *usage)
    }

    pub fn with_audio_ref<P: Into<PathBuf>>(mut self, audio_ref: P) -> Self {
        self.audio_ref = Some(audio_ref.into());
        self
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = Arc::new(segments);
        self
    }

    /// Adds a metadata entry. An existing key is never replaced; the new
    /// value lands under `key#2`, `key#3`, ...
    pub fn with_metadata<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        let key = key.into();
        let metadata = Arc::make_mut(&mut self.metadata);

        let slot = if metadata.contains_key(&key) {
            let mut n = 2;
            while metadata.contains_key(&format!("{}#{}", key, n)) {
                n += 1;
            }
            format!("{}#{}", key, n)
        } else {
            key
        };
        metadata.insert(slot, value);
        self
    }

    /// Adds `usage` to the stage's counters.
    pub fn with_token_usage<S: Into<String>>(mut self, stage: S, usage: TokenUsage) -> Self {
        *self.token_usage.entry(stage.into()).or_default() += usage;
        self
    }
}
