// Text generation collaborator
//
// Stages and the batch engine only see the LanguageModel trait:
// - ollama: HTTP client for a local or remote Ollama server

pub mod ollama;

use async_trait::async_trait;

pub use ollama::{OllamaModel, check_ollama_availability};

use crate::error::Result;
use crate::pipeline::TokenUsage;

/// Answer from a single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Absent when the backend does not report counts; counted as zero.
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn new<S: Into<String>>(text: S, usage: Option<TokenUsage>) -> Self {
        Self {
            text: text.into(),
            usage,
        }
    }

    pub fn usage_or_zero(&self) -> TokenUsage {
        self.usage.unwrap_or_default()
    }
}

/// Prompt in, text out. Implementations may fail on transport or format errors.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation>;
}
