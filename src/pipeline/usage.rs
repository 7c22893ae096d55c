use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};
use std::sync::Mutex;

/// Token counters reported by the language model for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: TokenUsage) {
        *self = *self + other;
    }
}

/// Per-stage usage accounting for one pipeline run.
///
/// Batches of the same stage record into it concurrently, so the map sits
/// behind a mutex. Entries only ever grow.
#[derive(Debug, Default)]
pub struct TokenUsageLedger {
    entries: Mutex<BTreeMap<String, TokenUsage>>,
}

impl TokenUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: &str, usage: TokenUsage) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        *entries.entry(stage.to_string()).or_default() += usage;
    }

    pub fn usage_for(&self, stage: &str) -> TokenUsage {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(stage).copied().unwrap_or_default()
    }

    pub fn total(&self) -> TokenUsage {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().fold(TokenUsage::default(), |acc, usage| acc + *usage)
    }

    pub fn snapshot(&self) -> BTreeMap<String, TokenUsage> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
