// Staged pipeline execution
//
// A run threads one PipelineState through a graph of named stages:
// - state: the value record each stage consumes and returns
// - usage: per-stage token accounting shared by a run
// - graph: builder, validation and sequential execution of stages

pub mod graph;
pub mod state;
pub mod usage;

use async_trait::async_trait;
use std::sync::Arc;

pub use graph::{END, Pipeline, PipelineBuilder};
pub use state::{PipelineState, Segment};
pub use usage::{TokenUsage, TokenUsageLedger};

use crate::error::Result;

/// Per-node handle passed to every hook of a stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    name: String,
    ledger: Arc<TokenUsageLedger>,
}

impl StageContext {
    pub fn new<S: Into<String>>(name: S, ledger: Arc<TokenUsageLedger>) -> Self {
        Self {
            name: name.into(),
            ledger,
        }
    }

    /// Node name the stage runs under; usage and metadata are keyed by it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &Arc<TokenUsageLedger> {
        &self.ledger
    }

    /// Copies this node's ledger entry into the state.
    pub fn settle_usage(&self, state: PipelineState) -> PipelineState {
        let usage = self.ledger.usage_for(&self.name);
        state.with_token_usage(self.name.clone(), usage)
    }
}

/// Unit of work in a pipeline
///
/// `run` composes the three hooks in order. Concrete stages supply
/// `process_core` and override the other hooks when they need prerequisite
/// work or bookkeeping.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn before_process(&self, state: PipelineState, _ctx: &StageContext) -> Result<PipelineState> {
        Ok(state)
    }

    async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState>;

    async fn after_process(&self, state: PipelineState, _ctx: &StageContext) -> Result<PipelineState> {
        Ok(state)
    }

    async fn run(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let state = self.before_process(state, ctx).await?;
        let state = self.process_core(state, ctx).await?;
        self.after_process(state, ctx).await
    }
}
