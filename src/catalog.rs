//! # Metadata Catalog
//!
//! In-process snapshot of the cluster metadata the query core consumes:
//! per-space vid length and partition count, tag and edge schema versions,
//! index items, and the kill registry for cooperative query cancellation.
//!
//! Catalog management (DDL, heartbeat, membership) lives in another
//! service; this is the client-side cache. Reads vastly outnumber
//! updates, so the space map is an `ArcSwap` snapshot: readers grab an
//! `Arc` without locking, writers rebuild the map under a mutex and swap
//! it in, bumping the catalog version. Cursors embed that version so a
//! resumed scan can detect metadata drift.

use crate::index::IndexItem;
use crate::schema::SchemaVersions;
use crate::{EdgeType, IndexId, PartitionId, SpaceId, TagId};
use arc_swap::ArcSwap;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub type SessionId = i64;
pub type PlanId = i64;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Space {0} not found")]
    SpaceNotFound(SpaceId),
    #[error("Space {0} already exists")]
    SpaceExists(SpaceId),
    #[error("Tag {0} already registered")]
    TagExists(TagId),
    #[error("Edge type {0} already registered")]
    EdgeExists(EdgeType),
    #[error("Edge type must be registered by its positive id, got {0}")]
    NegativeEdgeType(EdgeType),
    #[error("Index {0} already registered")]
    IndexExists(IndexId),
}

#[derive(Debug, Clone)]
pub struct TagMeta {
    pub id: TagId,
    pub name: String,
    pub schema: SchemaVersions,
}

#[derive(Debug, Clone)]
pub struct EdgeMeta {
    /// Positive id; the negative mirror shares this schema.
    pub id: EdgeType,
    pub name: String,
    pub schema: SchemaVersions,
}

/// Immutable description of one graph space.
#[derive(Debug, Clone)]
pub struct SpaceInfo {
    pub id: SpaceId,
    pub name: String,
    pub vid_len: usize,
    /// Partitions are numbered `1..=part_count`.
    pub part_count: PartitionId,
    tags: HashMap<TagId, TagMeta>,
    edges: HashMap<EdgeType, EdgeMeta>,
    indexes: HashMap<IndexId, Arc<IndexItem>>,
}

impl SpaceInfo {
    pub fn tag(&self, id: TagId) -> Option<&TagMeta> {
        self.tags.get(&id)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<&TagMeta> {
        self.tags.values().find(|t| t.name == name)
    }

    /// Edge metadata; the sign is stripped so both directions resolve to
    /// the shared schema.
    pub fn edge(&self, etype: EdgeType) -> Option<&EdgeMeta> {
        self.edges.get(&etype.abs())
    }

    pub fn edge_by_name(&self, name: &str) -> Option<&EdgeMeta> {
        self.edges.values().find(|e| e.name == name)
    }

    /// All positive edge type ids, ascending.
    pub fn edge_type_ids(&self) -> Vec<EdgeType> {
        let mut ids: Vec<EdgeType> = self.edges.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn tag_ids(&self) -> Vec<TagId> {
        let mut ids: Vec<TagId> = self.tags.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn index(&self, id: IndexId) -> Option<&Arc<IndexItem>> {
        self.indexes.get(&id)
    }

    /// Candidate indexes over one tag, id order for determinism.
    pub fn tag_indexes(&self, tag: TagId) -> Vec<Arc<IndexItem>> {
        self.schema_indexes(crate::protocol::SchemaRef::Tag(tag))
    }

    pub fn edge_indexes(&self, etype: EdgeType) -> Vec<Arc<IndexItem>> {
        self.schema_indexes(crate::protocol::SchemaRef::Edge(etype.abs()))
    }

    fn schema_indexes(&self, schema: crate::protocol::SchemaRef) -> Vec<Arc<IndexItem>> {
        let mut items: Vec<Arc<IndexItem>> = self
            .indexes
            .values()
            .filter(|item| item.schema == schema)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.index_id);
        items
    }
}

type SpaceMap = HashMap<SpaceId, Arc<SpaceInfo>>;

/// The catalog client: metadata snapshot plus the kill registry.
pub struct MetaCatalog {
    spaces: ArcSwap<SpaceMap>,
    version: AtomicU64,
    write_lock: Mutex<()>,
    killed: DashSet<(SessionId, PlanId)>,
}

impl Default for MetaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaCatalog {
    pub fn new() -> Self {
        MetaCatalog {
            spaces: ArcSwap::from_pointee(SpaceMap::new()),
            version: AtomicU64::new(1),
            write_lock: Mutex::new(()),
            killed: DashSet::new(),
        }
    }

    /// Monotonic version, bumped by every metadata change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn space(&self, id: SpaceId) -> Option<Arc<SpaceInfo>> {
        self.spaces.load().get(&id).cloned()
    }

    pub fn create_space(
        &self,
        id: SpaceId,
        name: &str,
        vid_len: usize,
        part_count: PartitionId,
    ) -> Result<(), CatalogError> {
        self.mutate(|map| {
            if map.contains_key(&id) {
                return Err(CatalogError::SpaceExists(id));
            }
            map.insert(
                id,
                Arc::new(SpaceInfo {
                    id,
                    name: name.to_string(),
                    vid_len,
                    part_count,
                    tags: HashMap::new(),
                    edges: HashMap::new(),
                    indexes: HashMap::new(),
                }),
            );
            Ok(())
        })
    }

    pub fn add_tag(
        &self,
        space: SpaceId,
        id: TagId,
        name: &str,
        schema: SchemaVersions,
    ) -> Result<(), CatalogError> {
        self.mutate_space(space, |info| {
            if info.tags.contains_key(&id) {
                return Err(CatalogError::TagExists(id));
            }
            info.tags.insert(id, TagMeta { id, name: name.to_string(), schema });
            Ok(())
        })
    }

    pub fn add_edge(
        &self,
        space: SpaceId,
        id: EdgeType,
        name: &str,
        schema: SchemaVersions,
    ) -> Result<(), CatalogError> {
        if id <= 0 {
            return Err(CatalogError::NegativeEdgeType(id));
        }
        self.mutate_space(space, |info| {
            if info.edges.contains_key(&id) {
                return Err(CatalogError::EdgeExists(id));
            }
            info.edges.insert(id, EdgeMeta { id, name: name.to_string(), schema });
            Ok(())
        })
    }

    pub fn add_index(&self, space: SpaceId, item: IndexItem) -> Result<(), CatalogError> {
        self.mutate_space(space, |info| {
            if info.indexes.contains_key(&item.index_id) {
                return Err(CatalogError::IndexExists(item.index_id));
            }
            info.indexes.insert(item.index_id, Arc::new(item));
            Ok(())
        })
    }

    fn mutate(&self, f: impl FnOnce(&mut SpaceMap) -> Result<(), CatalogError>) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock();
        let mut map = (**self.spaces.load()).clone();
        f(&mut map)?;
        self.spaces.store(Arc::new(map));
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn mutate_space(
        &self,
        space: SpaceId,
        f: impl FnOnce(&mut SpaceInfo) -> Result<(), CatalogError>,
    ) -> Result<(), CatalogError> {
        self.mutate(|map| {
            let current = map.get(&space).ok_or(CatalogError::SpaceNotFound(space))?;
            let mut info = (**current).clone();
            f(&mut info)?;
            map.insert(space, Arc::new(info));
            Ok(())
        })
    }

    // -- kill registry ------------------------------------------------------

    /// Mark `(session, plan)` killed; in-flight partitions observe it at
    /// their next poll.
    pub fn kill_plan(&self, session: SessionId, plan: PlanId) {
        self.killed.insert((session, plan));
    }

    pub fn is_killed(&self, session: SessionId, plan: PlanId) -> bool {
        self.killed.contains(&(session, plan))
    }

    pub fn clear_killed(&self, session: SessionId, plan: PlanId) {
        self.killed.remove(&(session, plan));
    }
}
