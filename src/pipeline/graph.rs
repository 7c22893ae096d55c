use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{PipelineState, Stage, StageContext, TokenUsageLedger};
use crate::error::{JimakuError, Result};

/// Terminal marker; the last edge of every pipeline points here.
pub const END: &str = "__end__";

/// Builder for a graph of named stages
#[derive(Default)]
pub struct PipelineBuilder {
    stages: HashMap<String, Arc<dyn Stage>>,
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under a node name
    pub fn add_stage<S: Into<String>>(mut self, name: S, stage: Arc<dyn Stage>) -> Self {
        let name = name.into();
        self.register_node(&name);
        self.stages.insert(name, stage);
        self
    }

    /// Add a directed edge. The first source ever added becomes the entry point.
    pub fn add_edge<S1: Into<String>, S2: Into<String>>(mut self, from: S1, to: S2) -> Self {
        let from = from.into();
        let to = to.into();

        self.register_node(&from);
        self.register_node(&to);

        if self.entry.is_none() {
            self.entry = Some(from.clone());
        }

        if !self.edges.iter().any(|(f, t)| *f == from && *t == to) {
            self.edges.push((from, to));
        }
        self
    }

    fn register_node(&mut self, name: &str) {
        if !self.nodes.iter().any(|n| n == name) {
            self.nodes.push(name.to_string());
        }
    }

    fn successors<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(from, _)| from == node)
            .map(|(_, to)| to.as_str())
    }

    /// Validate the graph and resolve the execution order
    pub fn build(self) -> Result<Pipeline> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| JimakuError::Configuration("Pipeline has no edges".to_string()))?;

        for node in &self.nodes {
            if node != END && !self.stages.contains_key(node) {
                return Err(JimakuError::Configuration(format!(
                    "Node '{}' has no registered stage",
                    node
                )));
            }
        }

        if self.edges.iter().any(|(from, _)| from == END) {
            return Err(JimakuError::Configuration(
                "The terminal marker cannot have outgoing edges".to_string(),
            ));
        }

        let terminal_edges = self.edges.iter().filter(|(_, to)| to == END).count();
        if terminal_edges != 1 {
            return Err(JimakuError::Configuration(format!(
                "Pipeline must have exactly one edge into the terminal marker, found {}",
                terminal_edges
            )));
        }

        self.check_acyclic()?;

        let reachable = self.reachable_from(&entry);
        if !reachable.contains(END) {
            return Err(JimakuError::Configuration(format!(
                "The terminal marker is not reachable from entry '{}'",
                entry
            )));
        }

        for node in &self.nodes {
            if node == END {
                continue;
            }
            if !reachable.contains(node.as_str()) {
                warn!("Stage '{}' is not reachable from '{}' and will not run", node, entry);
                continue;
            }
            if self.successors(node).next().is_none() {
                return Err(JimakuError::Configuration(format!(
                    "Stage '{}' has no outgoing edge; only the terminal marker may end a pipeline",
                    node
                )));
            }
        }

        let order = self.execution_order(&entry, &reachable);
        let stages = self
            .stages
            .into_iter()
            .filter(|(name, _)| reachable.contains(name.as_str()))
            .collect();

        Ok(Pipeline { order, stages })
    }

    fn reachable_from(&self, entry: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry.to_string()]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            for next in self.successors(&node) {
                queue.push_back(next.to_string());
            }
        }
        seen
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for (_, to) in &self.edges {
            *in_degree.entry(to.as_str()).or_default() += 1;
        }

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|n| n.as_str())
            .filter(|n| in_degree[n] == 0)
            .collect();
        let mut visited = 0;

        while let Some(node) = queue.pop_front() {
            visited += 1;
            for next in self.successors(node) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if visited != self.nodes.len() {
            return Err(JimakuError::Configuration("Pipeline graph contains a cycle".to_string()));
        }
        Ok(())
    }

    /// Topological order of the reachable stages, ties broken by edge order.
    fn execution_order(&self, entry: &str, reachable: &HashSet<String>) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> =
            reachable.iter().map(|n| (n.as_str(), 0)).collect();
        for (from, to) in &self.edges {
            if reachable.contains(from) {
                *in_degree.entry(to.as_str()).or_default() += 1;
            }
        }

        let mut order = Vec::new();
        let mut queue = VecDeque::from([entry]);
        while let Some(node) = queue.pop_front() {
            if node != END {
                order.push(node.to_string());
            }
            for next in self.successors(node) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }
        order
    }
}

/// Validated pipeline; stages run one after another in `node_order`.
pub struct Pipeline {
    order: Vec<String>,
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn node_order(&self) -> &[String] {
        &self.order
    }

    /// Run every stage from the entry to the terminal marker.
    pub async fn execute(&self, initial_state: PipelineState) -> Result<PipelineState> {
        let ledger = Arc::new(TokenUsageLedger::new());
        let mut state = initial_state;

        for name in &self.order {
            let stage = self.stages.get(name).ok_or_else(|| {
                JimakuError::Configuration(format!("Node '{}' has no registered stage", name))
            })?;

            info!("┌─ Stage '{}' ────────", name);
            let started = Instant::now();
            let ctx = StageContext::new(name.clone(), ledger.clone());

            state = stage.run(state, &ctx).await.map_err(|e| {
                error!("└─ Stage '{}' failed: {}", name, e);
                JimakuError::Stage {
                    stage: name.clone(),
                    source: Box::new(e),
                }
            })?;

            info!("└─ Stage '{}' completed in {:.1?}", name, started.elapsed());
        }

        let total = ledger.total();
        info!(
            "Pipeline finished: {} input tokens, {} output tokens",
            total.input_tokens, total.output_tokens
        );

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::pipeline::TokenUsage;

    /// Appends its name to the context and to a shared trace.
    struct Tag {
        tag: &'static str,
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Stage for Tag {
        async fn process_core(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
            self.trace.lock().unwrap().push(self.tag);
            ctx.ledger().record(ctx.name(), TokenUsage::new(1, 1));
            let context = format!("{}{}", state.context().unwrap_or(""), self.tag);
            Ok(state
                .with_context(context)
                .with_metadata(ctx.name(), json!({"tag": self.tag})))
        }

        async fn after_process(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
            Ok(ctx.settle_usage(state))
        }
    }

    struct Failing;

    #[async_trait]
    impl Stage for Failing {
        async fn process_core(&self, _state: PipelineState, _ctx: &StageContext) -> Result<PipelineState> {
            Err(JimakuError::Transcription("whisper crashed".to_string()))
        }
    }

    fn tag(tag: &'static str, trace: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Stage> {
        Arc::new(Tag {
            tag,
            trace: trace.clone(),
        })
    }

    #[tokio::test]
    async fn test_linear_chain_threads_state_in_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .add_stage("a", tag("a", &trace))
            .add_stage("b", tag("b", &trace))
            .add_stage("c", tag("c", &trace))
            .add_edge("a", "b")
            .add_edge("b", "c")
            .add_edge("c", END)
            .build()
            .unwrap();

        let state = pipeline.execute(PipelineState::new("in.mp4")).await.unwrap();

        assert_eq!(pipeline.node_order(), ["a", "b", "c"]);
        assert_eq!(*trace.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(state.context(), Some("abc"));
        assert_eq!(state.metadata().len(), 3);
        assert_eq!(state.token_usage()["b"], TokenUsage::new(1, 1));
    }

    #[test]
    fn test_entry_is_first_source_and_duplicate_edges_are_ignored() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .add_stage("second", tag("2", &trace))
            .add_stage("first", tag("1", &trace))
            .add_edge("first", "second")
            .add_edge("first", "second")
            .add_edge("second", END)
            .build()
            .unwrap();

        assert_eq!(pipeline.node_order(), ["first", "second"]);
    }

    #[test]
    fn test_branches_run_in_edge_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .add_stage("root", tag("r", &trace))
            .add_stage("left", tag("l", &trace))
            .add_stage("right", tag("x", &trace))
            .add_stage("join", tag("j", &trace))
            .add_edge("root", "left")
            .add_edge("root", "right")
            .add_edge("left", "join")
            .add_edge("right", "join")
            .add_edge("join", END)
            .build()
            .unwrap();

        assert_eq!(pipeline.node_order(), ["root", "left", "right", "join"]);
    }

    #[test]
    fn test_missing_stage_is_configuration_error() {
        let result = PipelineBuilder::new().add_edge("ghost", END).build();
        assert!(matches!(result, Err(JimakuError::Configuration(_))));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let result = PipelineBuilder::new()
            .add_stage("a", tag("a", &trace))
            .add_stage("b", tag("b", &trace))
            .add_edge("a", "b")
            .add_edge("b", "a")
            .add_edge("b", END)
            .build();
        assert!(matches!(result, Err(JimakuError::Configuration(m)) if m.contains("cycle")));
    }

    #[test]
    fn test_terminal_marker_must_appear_exactly_once() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let missing = PipelineBuilder::new()
            .add_stage("a", tag("a", &trace))
            .add_stage("b", tag("b", &trace))
            .add_edge("a", "b")
            .build();
        assert!(matches!(missing, Err(JimakuError::Configuration(_))));

        let doubled = PipelineBuilder::new()
            .add_stage("a", tag("a", &trace))
            .add_stage("b", tag("b", &trace))
            .add_edge("a", "b")
            .add_edge("a", END)
            .add_edge("b", END)
            .build();
        assert!(matches!(doubled, Err(JimakuError::Configuration(_))));
    }

    #[test]
    fn test_empty_builder_is_rejected() {
        assert!(matches!(
            PipelineBuilder::new().build(),
            Err(JimakuError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_run_and_names_stage() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .add_stage("extract", tag("e", &trace))
            .add_stage("transcribe", Arc::new(Failing))
            .add_stage("translate", tag("t", &trace))
            .add_edge("extract", "transcribe")
            .add_edge("transcribe", "translate")
            .add_edge("translate", END)
            .build()
            .unwrap();

        let err = pipeline.execute(PipelineState::new("in.mp4")).await.unwrap_err();

        assert!(matches!(&err, JimakuError::Stage { stage, .. } if stage == "transcribe"));
        assert_eq!(*trace.lock().unwrap(), vec!["e"]);
    }
}
