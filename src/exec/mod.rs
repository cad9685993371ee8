//! # Execution Plans and Nodes
//!
//! A per-partition dataflow graph of typed nodes answering one request.
//! The plan ([`plan::StoragePlan`]) owns every node and drives them
//! depth-first with memoisation, so shared sub-nodes execute at most once
//! per partition run. Nodes communicate through per-run output slots, one
//! per node.
//!
//! ```text
//! NeighborsRequest                ScanRequest            LookupRequest
//!       |                             |                       |
//!   TagNode x N   EdgeNode x M   ScanVertexNode         IndexScanNode
//!       \             /          ScanEdgeNode                |
//!        NeighborNode                 |                IndexOutputNode
//!             |                   OutputNode            (TopN | Limit)
//!          (1 row per vid)                                OutputNode
//! ```
//!
//! Every row-producing loop polls the kill checker first; a killed plan
//! surfaces `PLAN_IS_KILLED` for its partition within one row emission.

pub mod edge_node;
pub mod index_node;
pub mod neighbor;
pub mod node;
pub mod plan;
pub mod scan_node;
pub mod tag_node;

pub use plan::{ExecState, NodeId, NodeOutput, PlanInput, RelNode, StoragePlan};

use crate::catalog::SpaceInfo;
use crate::expr::{ExprContext, ExprError};
use crate::keys;
use crate::protocol::ErrorCode;
use crate::runtime::KillChecker;
use crate::schema::TtlInfo;
use crate::store::{KvStore, StoreError};
use crate::value::{Row, Value};
use crate::{EdgeType, PartitionId};
use std::sync::Arc;

/// Why a partition run stopped.
#[derive(Debug, Clone)]
pub enum ExecError {
    /// Partition-local failure, reported in `failed_parts`.
    Code(ErrorCode),
    /// Request-fatal semantic failure with its human-readable sentence.
    Semantic(String),
}

impl From<StoreError> for ExecError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LeaderChanged { .. } => ExecError::Code(ErrorCode::LeaderChanged),
            StoreError::Io { .. } => ExecError::Code(ErrorCode::StorageError),
        }
    }
}

impl From<ExprError> for ExecError {
    fn from(e: ExprError) -> Self {
        ExecError::Semantic(e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Per-partition execution environment. One instance per partition task;
/// nothing here is shared across partitions except the store and space
/// metadata, which are read-only.
pub struct RuntimeContext {
    pub space: Arc<SpaceInfo>,
    pub store: Arc<dyn KvStore>,
    pub kill: KillChecker,
    /// Request start time (epoch seconds) used by every TTL decision.
    pub now: i64,
    /// `mock_ttl_col` / `mock_ttl_duration` override, when configured.
    pub ttl_override: Option<TtlInfo>,
}

impl RuntimeContext {
    pub fn vid_len(&self) -> usize {
        self.space.vid_len
    }

    /// Poll the kill registry; `Err(PLAN_IS_KILLED)` stops the partition.
    pub fn check_killed(&self) -> ExecResult<()> {
        if self.kill.check() {
            return Err(ExecError::Code(ErrorCode::PlanIsKilled));
        }
        Ok(())
    }
}

/// Decoded properties of one row, in schema order.
pub type PropMap = Vec<(String, Value)>;

/// Streaming accumulator behind `SUM`/`AVG`/`MIN`/`MAX`/`COUNT`, shared
/// by the expansion kernel's stat columns and the aggregate node.
/// `COUNT` counts every fed value; the numeric folds ignore non-numeric
/// input. Empty input finishes to the additive identity for `SUM` and
/// `COUNT` and to `Null` for the rest.
#[derive(Default, Clone)]
pub struct StatAccumulator {
    count: i64,
    sum_i: i64,
    sum_f: f64,
    saw_float: bool,
    min: Option<Value>,
    max: Option<Value>,
}

impl StatAccumulator {
    pub fn feed(&mut self, value: &Value) {
        self.count += 1;
        match value {
            Value::Int(v) | Value::Timestamp(v) => self.sum_i += v,
            Value::Float(v) => {
                self.sum_f += v;
                self.saw_float = true;
            }
            _ => return,
        }
        let take_min = match &self.min {
            None => true,
            Some(existing) => value.total_order(existing) == std::cmp::Ordering::Less,
        };
        if take_min {
            self.min = Some(value.clone());
        }
        let take_max = match &self.max {
            None => true,
            Some(existing) => value.total_order(existing) == std::cmp::Ordering::Greater,
        };
        if take_max {
            self.max = Some(value.clone());
        }
    }

    pub fn finish(&self, stat: crate::protocol::StatType) -> Value {
        use crate::protocol::StatType;
        match stat {
            StatType::Count => Value::Int(self.count),
            StatType::Sum => {
                if self.saw_float {
                    Value::Float(self.sum_f + self.sum_i as f64)
                } else {
                    Value::Int(self.sum_i)
                }
            }
            StatType::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Float((self.sum_f + self.sum_i as f64) / self.count as f64)
                }
            }
            StatType::Min => self.min.clone().unwrap_or(Value::Null),
            StatType::Max => self.max.clone().unwrap_or(Value::Null),
        }
    }
}

pub fn find_prop(props: &PropMap, name: &str) -> Option<Value> {
    props.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
}

/// Reference to the entity behind one index entry. Index entries carry
/// no properties; the output node fetches the base row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexRef {
    Vertex { vid: Vec<u8> },
    Edge { src: Vec<u8>, rank: i64, dst: Vec<u8> },
}

/// One decoded edge, key columns included.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub src: Vec<u8>,
    pub dst: Vec<u8>,
    /// Signed: negative for the reverse direction.
    pub etype: EdgeType,
    pub rank: i64,
    pub props: PropMap,
}

/// Expression context for the expansion kernel: one source vertex, its
/// tag rows, and the edge currently under the iterator. Tag properties
/// resolve against the source's tags; edge properties resolve against the
/// current edge when the (sign-stripped) name matches.
pub struct StorageExprContext<'a> {
    pub ctx: &'a RuntimeContext,
    pub part: PartitionId,
    pub vid: &'a [u8],
    /// `(tag name, decoded props)`; `None` when the vertex lacks the tag.
    pub tags: &'a [(String, Option<PropMap>)],
    pub edge: Option<&'a EdgeRow>,
    /// Sign-stripped name of the edge type under iteration.
    pub edge_name: &'a str,
}

impl StorageExprContext<'_> {
    fn current_edge(&self, name: &str) -> Option<&EdgeRow> {
        if name == self.edge_name {
            self.edge
        } else {
            None
        }
    }
}

impl ExprContext for StorageExprContext<'_> {
    fn src_vid(&self) -> Value {
        Value::Str(String::from_utf8_lossy(keys::trim_vid(self.vid)).into_owned())
    }

    fn tag_property(&self, tag: &str, prop: &str) -> Value {
        match self.tags.iter().find(|(name, _)| name == tag) {
            Some((_, Some(props))) => find_prop(props, prop).unwrap_or(Value::Empty),
            _ => Value::Empty,
        }
    }

    fn edge_property(&self, edge: &str, prop: &str) -> Value {
        match self.current_edge(edge) {
            Some(row) => find_prop(&row.props, prop).unwrap_or(Value::Empty),
            None => Value::Empty,
        }
    }

    // dst_property keeps its Empty default: the destination vertex lives
    // in its own partition, possibly on another host, so destination
    // properties are rejected at request validation instead.

    fn edge_src(&self, edge: &str) -> Value {
        match self.current_edge(edge) {
            Some(row) => Value::Str(String::from_utf8_lossy(keys::trim_vid(&row.src)).into_owned()),
            None => Value::Empty,
        }
    }

    fn edge_dst(&self, edge: &str) -> Value {
        match self.current_edge(edge) {
            Some(row) => Value::Str(String::from_utf8_lossy(keys::trim_vid(&row.dst)).into_owned()),
            None => Value::Empty,
        }
    }

    fn edge_rank(&self, edge: &str) -> Value {
        match self.current_edge(edge) {
            Some(row) => Value::Int(row.rank),
            None => Value::Empty,
        }
    }

    fn edge_type_value(&self, edge: &str) -> Value {
        match self.current_edge(edge) {
            Some(row) => Value::Int(i64::from(row.etype)),
            None => Value::Empty,
        }
    }
}

/// Expression context over one materialised row, used by generic filter
/// and aggregate nodes: `$-.col` input properties resolve by column name.
pub struct RowExprContext<'a> {
    pub columns: &'a [String],
    pub row: &'a Row,
}

impl ExprContext for RowExprContext<'_> {
    fn input_property(&self, name: &str) -> Value {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => self.row.values.get(idx).cloned().unwrap_or(Value::Empty),
            None => Value::Empty,
        }
    }
}
