//! # RPC Surface Types
//!
//! Request and response structs for the three query entry points, the
//! partition-scoped error codes, and the synthetic column names. The
//! transport is length-prefixed, type-tagged binary ([`wire`]); filters
//! and stat expressions travel inside requests as encoded expression byte
//! strings (see `expr::codec`), never as serde structures.

pub mod wire;

use crate::value::{DataSet, Value};
use crate::{EdgeType, IndexId, PartitionId, SpaceId, TagId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Synthetic column names servable from keys alone.
pub const K_VID: &str = "_vid";
pub const K_TAG: &str = "_tag";
pub const K_SRC: &str = "_src";
pub const K_TYPE: &str = "_type";
pub const K_RANK: &str = "_rank";
pub const K_DST: &str = "_dst";
pub const K_STATS: &str = "_stats";
pub const K_EXPR: &str = "_expr";

/// Result code for one partition, or for the whole request when every
/// requested partition reports the same validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Succeeded,
    SpaceNotFound,
    TagNotFound,
    EdgeNotFound,
    TagPropNotFound,
    EdgePropNotFound,
    IndexNotFound,
    SemanticError,
    PlanIsKilled,
    LeaderChanged,
    StorageError,
    InvalidCursor,
}

impl ErrorCode {
    /// Request-fatal codes abort the whole request with no rows; the rest
    /// are partition-local.
    pub fn is_request_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::SpaceNotFound
                | ErrorCode::TagNotFound
                | ErrorCode::EdgeNotFound
                | ErrorCode::TagPropNotFound
                | ErrorCode::EdgePropNotFound
                | ErrorCode::IndexNotFound
                | ErrorCode::SemanticError
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionResult {
    pub part_id: PartitionId,
    pub code: ErrorCode,
}

/// Trailer shared by every response. A partition absent from
/// `failed_parts` succeeded. `error_msg` carries the human-readable
/// sentence for request-fatal failures (semantic errors in particular).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCommon {
    pub failed_parts: Vec<PartitionResult>,
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCommon {
    pub session_id: i64,
    pub plan_id: i64,
    /// Ask for per-partition reader-pool dispatch; the `query_concurrently`
    /// config flag enables it for every request.
    #[serde(default)]
    pub concurrently: bool,
}

// ---------------------------------------------------------------------------
// neighbor request

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeDirection {
    In,
    Out,
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatType {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// One per-edge statistic: `expression` is an encoded expression evaluated
/// per edge (post-filter), folded into `stat` across the source's edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatProp {
    pub alias: String,
    pub expression: Vec<u8>,
    pub stat: StatType,
}

/// Requested properties of one tag. `props: None` asks for bare tag
/// presence; `Some(vec![])` means every property in schema order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexProp {
    pub tag: TagId,
    pub props: Option<Vec<String>>,
}

/// Requested properties of one edge type (signed: negative ids are the
/// reverse direction). Same `props` conventions as [`VertexProp`], plus
/// the synthetic `_src` / `_dst` / `_rank` / `_type` columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeProp {
    pub edge: EdgeType,
    pub props: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraverseSpec {
    /// Empty means every edge type of the space, per `edge_direction`.
    pub edge_types: Vec<EdgeType>,
    #[serde(default)]
    pub edge_direction: EdgeDirection,
    #[serde(default)]
    pub vertex_props: Vec<VertexProp>,
    #[serde(default)]
    pub edge_props: Vec<EdgeProp>,
    #[serde(default)]
    pub stat_props: Vec<StatProp>,
    /// Encoded filter expression evaluated per edge.
    pub filter: Option<Vec<u8>>,
    /// Per-vertex edge cap; `0` returns empty edge lists.
    pub limit: Option<i64>,
    /// Switch `limit` from truncation to reservoir sampling.
    #[serde(default)]
    pub random: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborsRequest {
    pub space_id: SpaceId,
    /// Source vids per partition, unpadded.
    pub parts: BTreeMap<PartitionId, Vec<Vec<u8>>>,
    pub traverse_spec: TraverseSpec,
    #[serde(default)]
    pub common: RequestCommon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborsResponse {
    pub result: ResponseCommon,
    pub vertices: Option<DataSet>,
}

// ---------------------------------------------------------------------------
// scan requests

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanCursor {
    pub next_cursor: Option<Vec<u8>>,
    #[serde(default)]
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanVertexRequest {
    pub space_id: SpaceId,
    pub parts: BTreeMap<PartitionId, ScanCursor>,
    pub return_columns: Vec<VertexProp>,
    /// Per-partition row cap.
    pub limit: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    /// Accepted for compatibility; the store serves one version per key.
    #[serde(default)]
    pub only_latest_version: bool,
    #[serde(default)]
    pub common: RequestCommon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEdgeRequest {
    pub space_id: SpaceId,
    pub parts: BTreeMap<PartitionId, ScanCursor>,
    pub return_columns: Vec<EdgeProp>,
    pub limit: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    #[serde(default)]
    pub only_latest_version: bool,
    #[serde(default)]
    pub common: RequestCommon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResponse {
    pub result: ResponseCommon,
    pub props: DataSet,
    pub cursors: BTreeMap<PartitionId, ScanCursor>,
}

// ---------------------------------------------------------------------------
// index lookup

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanType {
    Prefix,
    Range,
}

/// A per-column constraint pushed into the storage iterator: either an
/// equality prefix (`begin_value` only) or a range with explicit
/// inclusivity flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHint {
    pub column_name: String,
    pub scan_type: ScanType,
    pub begin_value: Option<Value>,
    #[serde(default)]
    pub include_begin: bool,
    pub end_value: Option<Value>,
    #[serde(default)]
    pub include_end: bool,
}

impl ColumnHint {
    pub fn prefix(column_name: &str, value: Value) -> Self {
        ColumnHint {
            column_name: column_name.to_string(),
            scan_type: ScanType::Prefix,
            begin_value: Some(value),
            include_begin: true,
            end_value: None,
            include_end: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexQueryContext {
    pub index_id: IndexId,
    pub column_hints: Vec<ColumnHint>,
    /// Residual filter evaluated on the referenced row after decode.
    pub filter: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaRef {
    Tag(TagId),
    Edge(EdgeType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub prop: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRequest {
    pub space_id: SpaceId,
    pub parts: Vec<PartitionId>,
    pub schema: SchemaRef,
    pub contexts: Vec<IndexQueryContext>,
    pub return_columns: Vec<String>,
    pub limit: Option<i64>,
    /// When present, `limit` applies per partition after sorting (top-N).
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub common: RequestCommon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupResponse {
    pub result: ResponseCommon,
    pub data: DataSet,
}
