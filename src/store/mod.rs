//! # Key-Value Store Interface
//!
//! The engine reads a partitioned, replicated KV store through this
//! boundary. The production engine lives in another process; [`memory`]
//! provides the in-process implementation used by tests, fixtures and
//! benchmarks.
//!
//! Iterators snapshot: once opened, an iterator observes a consistent
//! view of its partition regardless of concurrent writers. Keys are
//! positioned single-threaded within one partition.

pub mod memory;

pub use memory::MemoryStore;

use crate::{PartitionId, SpaceId};
use thiserror::Error;

/// Partition-local read failures. These surface as entries in a
/// response's `failed_parts`, never as request-fatal errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Partition {part} leadership moved")]
    LeaderChanged { part: PartitionId },
    #[error("I/O failure reading partition {part}: {message}")]
    Io { part: PartitionId, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Forward iterator over one partition's keys. `key`/`value` are only
/// meaningful while `valid` returns true.
pub trait KvIterator: Send {
    fn valid(&self) -> bool;
    fn advance(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
}

pub trait KvStore: Send + Sync {
    /// Point lookup; `Ok(None)` when the key is absent.
    fn get(&self, space: SpaceId, part: PartitionId, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// All keys starting with `prefix`, in key order.
    fn prefix(
        &self,
        space: SpaceId,
        part: PartitionId,
        prefix: &[u8],
    ) -> StoreResult<Box<dyn KvIterator>>;

    /// Keys starting with `prefix`, beginning at `start` (a cursor resume
    /// position inside the prefix).
    fn range_with_prefix(
        &self,
        space: SpaceId,
        part: PartitionId,
        start: &[u8],
        prefix: &[u8],
    ) -> StoreResult<Box<dyn KvIterator>>;

    /// Keys in `[begin, end)`; `end = None` is unbounded above.
    fn range(
        &self,
        space: SpaceId,
        part: PartitionId,
        begin: &[u8],
        end: Option<&[u8]>,
    ) -> StoreResult<Box<dyn KvIterator>>;
}
