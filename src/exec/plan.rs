//! The per-partition execution plan.
//!
//! A DAG of nodes owned by one `Vec`; dependencies are recorded as stable
//! indices into it, so nodes never own each other and shared subgraphs
//! are safe. On the first `go` the plan synthesises a sink depending on
//! every node without dependents; later calls reuse it.
//!
//! The drive is a memoised depth-first walk: a visited flag per node,
//! reset at each `go`, guarantees every node executes exactly once per
//! partition invocation even when several nodes share a dependency. The
//! tempting alternative - composing each node's result as a future and
//! letting dependents collect them - re-executes shared sub-nodes and is
//! measurably slower (see `benches/plan_benchmarks.rs`).

use super::{EdgeRow, ExecError, ExecResult, IndexRef, PropMap, RuntimeContext};
use crate::protocol::ScanCursor;
use crate::value::Row;

pub type NodeId = usize;

/// Input the dispatcher feeds into one `go` call.
#[derive(Debug, Clone, Default)]
pub enum PlanInput {
    #[default]
    None,
    /// One source vertex (fixed-width vid), for neighbor expansion.
    Vid(Vec<u8>),
    /// Scan resume position; `None` starts at the partition prefix.
    Cursor(Option<Vec<u8>>),
}

/// What one node produced for the current run.
#[derive(Debug, Clone, Default)]
pub enum NodeOutput {
    #[default]
    None,
    /// Decoded tag row of the current source (`None` = vertex lacks it).
    TagRow(Option<PropMap>),
    /// Decoded edges of one edge type for the current source.
    Edges(Vec<EdgeRow>),
    /// Entity references yielded by an index scan.
    Refs(Vec<IndexRef>),
    /// Materialised rows.
    Rows(Vec<Row>),
    /// Materialised rows plus a resumption cursor.
    Scan { rows: Vec<Row>, cursor: ScanCursor },
}

impl NodeOutput {
    /// Rows view shared by the row-shaped variants.
    pub fn rows(&self) -> &[Row] {
        match self {
            NodeOutput::Rows(rows) | NodeOutput::Scan { rows, .. } => rows,
            _ => &[],
        }
    }

    pub fn take_rows(&mut self) -> Vec<Row> {
        match std::mem::take(self) {
            NodeOutput::Rows(rows) | NodeOutput::Scan { rows, .. } => rows,
            _ => Vec::new(),
        }
    }
}

/// Per-run state: the partition, the input, and one output slot per node.
pub struct ExecState {
    pub part: crate::PartitionId,
    pub input: PlanInput,
    pub outputs: Vec<NodeOutput>,
}

impl ExecState {
    /// The fixed-width vid of a neighbor run.
    pub fn vid(&self) -> ExecResult<&[u8]> {
        match &self.input {
            PlanInput::Vid(vid) => Ok(vid),
            _ => Err(ExecError::Code(crate::protocol::ErrorCode::StorageError)),
        }
    }

    pub fn cursor(&self) -> Option<&[u8]> {
        match &self.input {
            PlanInput::Cursor(Some(c)) => Some(c),
            _ => None,
        }
    }
}

/// One typed execution node. `execute` reads its dependencies' outputs
/// from the state and returns its own.
pub trait RelNode: Send {
    fn name(&self) -> &'static str;

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput>;
}

/// Synthesised sink depending on every node without dependents.
struct SinkNode;

impl RelNode for SinkNode {
    fn name(&self) -> &'static str {
        "SinkNode"
    }

    fn execute(&mut self, _ctx: &RuntimeContext, _state: &ExecState) -> ExecResult<NodeOutput> {
        Ok(NodeOutput::None)
    }
}

pub struct StoragePlan {
    nodes: Vec<Box<dyn RelNode>>,
    deps: Vec<Vec<NodeId>>,
    has_dependents: Vec<bool>,
    sink: Option<NodeId>,
    output: Option<NodeId>,
}

/// Result of one partition invocation.
#[derive(Debug, Default)]
pub struct GoOutcome {
    pub rows: Vec<Row>,
    pub cursor: Option<ScanCursor>,
}

impl Default for StoragePlan {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePlan {
    pub fn new() -> StoragePlan {
        StoragePlan {
            nodes: Vec::new(),
            deps: Vec::new(),
            has_dependents: Vec::new(),
            sink: None,
            output: None,
        }
    }

    /// Add a node, returning its stable id.
    pub fn add_node(&mut self, node: Box<dyn RelNode>) -> NodeId {
        self.nodes.push(node);
        self.deps.push(Vec::new());
        self.has_dependents.push(false);
        self.nodes.len() - 1
    }

    /// Record that `node` depends on `dep`; `dep` will run first.
    pub fn add_dependency(&mut self, node: NodeId, dep: NodeId) {
        self.deps[node].push(dep);
        self.has_dependents[dep] = true;
    }

    /// Designate the node whose rows `go` returns.
    pub fn set_output(&mut self, node: NodeId) {
        self.output = Some(node);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Run the plan for one partition. Every node executes exactly once;
    /// the first failing node short-circuits the run.
    pub fn go(
        &mut self,
        ctx: &RuntimeContext,
        part: crate::PartitionId,
        input: PlanInput,
    ) -> ExecResult<GoOutcome> {
        let sink = match self.sink {
            Some(sink) => sink,
            None => {
                let leaves: Vec<NodeId> = (0..self.nodes.len())
                    .filter(|id| !self.has_dependents[*id])
                    .collect();
                let sink = self.add_node(Box::new(SinkNode));
                for leaf in leaves {
                    self.add_dependency(sink, leaf);
                }
                self.sink = Some(sink);
                sink
            }
        };

        let mut state = ExecState {
            part,
            input,
            outputs: std::iter::repeat_with(NodeOutput::default)
                .take(self.nodes.len())
                .collect(),
        };
        let mut visited = vec![false; self.nodes.len()];
        self.drive(sink, ctx, &mut state, &mut visited)?;

        let mut outcome = GoOutcome::default();
        if let Some(output) = self.output {
            if let NodeOutput::Scan { cursor, .. } = &state.outputs[output] {
                outcome.cursor = Some(cursor.clone());
            }
            outcome.rows = state.outputs[output].take_rows();
        }
        Ok(outcome)
    }

    fn drive(
        &mut self,
        id: NodeId,
        ctx: &RuntimeContext,
        state: &mut ExecState,
        visited: &mut [bool],
    ) -> ExecResult<()> {
        if visited[id] {
            return Ok(());
        }
        visited[id] = true;
        let deps = self.deps[id].clone();
        for dep in deps {
            self.drive(dep, ctx, state, visited)?;
        }
        let output = self.nodes[id].execute(ctx, &*state)?;
        state.outputs[id] = output;
        Ok(())
    }
}
