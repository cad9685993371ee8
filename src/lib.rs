//! # Quiver Storage Query Core
//!
//! The storage-side query core of a distributed property-graph database:
//! answers neighbor-traversal, vertex/edge scan, and index-lookup
//! requests by reading a partitioned, multi-version key-value store and
//! returning result sets shaped for the graph query planner.
//!
//! ## Request Pipeline
//!
//! ```text
//! Request (wire frame)
//!     ↓
//! [protocol]                 → typed request struct
//!     ↓
//! [query]  validation        → catalog-checked contexts, folded filters
//!     ↓
//! [query]  dispatch          → one plan per partition (inline or pool)
//!     ↓
//! [exec]   StoragePlan       → memoised depth-first node drive
//!     ├── [keys]             → prefix / range construction
//!     ├── [store]            → KV iterators (snapshot per partition)
//!     ├── [row]              → schema-versioned decode, TTL, defaults
//!     ├── [expr]             → per-row filter / stat evaluation
//!     └── [index]            → hint intervals for index scans
//!     ↓
//! [query]  merge             → rows in partition order + failed_parts
//!     ↓
//! Response (DataSet, cursors)
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | `Value` / `Row` / `DataSet` runtime types |
//! | `schema` | versioned tag and edge field layouts, TTL |
//! | `catalog` | metadata snapshot + kill registry |
//! | `keys` | on-disk key codec |
//! | `row` | row blob reader/writer |
//! | `expr` | filter expressions: parse, encode, fold, eval |
//! | `index` | index metadata, hint intervals, index selection |
//! | `store` | KV store interface + in-memory implementation |
//! | `exec` | execution plan and node library |
//! | `query` | request processors and partition dispatch |
//! | `protocol` | RPC structs, error codes, wire framing |
//! | `cursor` | opaque scan resumption tokens |
//! | `runtime` | reader pool, kill-check throttling |
//! | `config` | layered configuration |
//! | `logging` | tracing subscriber setup |

pub mod catalog;
pub mod config;
pub mod cursor;
pub mod exec;
pub mod expr;
pub mod index;
pub mod keys;
pub mod logging;
pub mod protocol;
pub mod query;
pub mod row;
pub mod runtime;
pub mod schema;
pub mod store;
pub mod value;

/// Graph space identifier.
pub type SpaceId = i64;
/// Partition identifier; partitions are numbered from 1.
pub type PartitionId = u32;
/// Tag (vertex schema) identifier.
pub type TagId = i32;
/// Edge type identifier; the negative id is the reverse direction.
pub type EdgeType = i32;
/// Secondary index identifier.
pub type IndexId = u32;

pub use catalog::MetaCatalog;
pub use config::Config;
pub use query::QueryEngine;
pub use store::{KvStore, MemoryStore};
pub use value::{DataSet, Row, Value};
