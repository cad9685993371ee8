//! In-memory KV store.
//!
//! A `BTreeMap` per `(space, partition)` behind one `RwLock`. Iterators
//! copy their range out under the read lock, which gives the snapshot
//! guarantee of the interface for free. Tests can mark a partition's
//! leadership as moved to exercise the retry surface.

use super::{KvIterator, KvStore, StoreError, StoreResult};
use crate::{PartitionId, SpaceId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
pub struct MemoryStore {
    parts: RwLock<HashMap<(SpaceId, PartitionId), BTreeMap<Vec<u8>, Vec<u8>>>>,
    moved_leaders: RwLock<HashSet<(SpaceId, PartitionId)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, space: SpaceId, part: PartitionId, key: Vec<u8>, value: Vec<u8>) {
        self.parts.write().entry((space, part)).or_default().insert(key, value);
    }

    pub fn remove(&self, space: SpaceId, part: PartitionId, key: &[u8]) {
        if let Some(data) = self.parts.write().get_mut(&(space, part)) {
            data.remove(key);
        }
    }

    /// Simulate a leadership move; subsequent reads of the partition fail
    /// with `LeaderChanged` until cleared.
    pub fn set_leader_moved(&self, space: SpaceId, part: PartitionId, moved: bool) {
        let mut set = self.moved_leaders.write();
        if moved {
            set.insert((space, part));
        } else {
            set.remove(&(space, part));
        }
    }

    fn check_leader(&self, space: SpaceId, part: PartitionId) -> StoreResult<()> {
        if self.moved_leaders.read().contains(&(space, part)) {
            return Err(StoreError::LeaderChanged { part });
        }
        Ok(())
    }

    fn collect(
        &self,
        space: SpaceId,
        part: PartitionId,
        begin: &[u8],
        end: Option<&[u8]>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let parts = self.parts.read();
        let Some(data) = parts.get(&(space, part)) else {
            return Vec::new();
        };
        data.range(begin.to_vec()..)
            .take_while(|(k, _)| end.is_none_or(|e| k.as_slice() < e))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, space: SpaceId, part: PartitionId, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_leader(space, part)?;
        Ok(self.parts.read().get(&(space, part)).and_then(|data| data.get(key).cloned()))
    }

    fn prefix(
        &self,
        space: SpaceId,
        part: PartitionId,
        prefix: &[u8],
    ) -> StoreResult<Box<dyn KvIterator>> {
        self.range_with_prefix(space, part, prefix, prefix)
    }

    fn range_with_prefix(
        &self,
        space: SpaceId,
        part: PartitionId,
        start: &[u8],
        prefix: &[u8],
    ) -> StoreResult<Box<dyn KvIterator>> {
        self.check_leader(space, part)?;
        let begin = if start.is_empty() { prefix } else { start };
        let entries: Vec<_> = self
            .collect(space, part, begin, None)
            .into_iter()
            .take_while(|(k, _)| k.starts_with(prefix))
            .collect();
        Ok(Box::new(VecIterator { entries, pos: 0 }))
    }

    fn range(
        &self,
        space: SpaceId,
        part: PartitionId,
        begin: &[u8],
        end: Option<&[u8]>,
    ) -> StoreResult<Box<dyn KvIterator>> {
        self.check_leader(space, part)?;
        let entries = self.collect(space, part, begin, end);
        Ok(Box::new(VecIterator { entries, pos: 0 }))
    }
}

struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl KvIterator for VecIterator {
    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }
}
