//! # Request Processors
//!
//! One processor per RPC entry point: neighbor expansion
//! ([`neighbors`]), vertex/edge scans ([`scan`]), and index lookups
//! ([`lookup`]). Each follows the same shape:
//!
//! 1. validate the request against the catalog - any unknown reference
//!    fails the whole request, no partial success;
//! 2. build the plan template (decode, resolve and fold filter
//!    expressions once per request);
//! 3. run one plan per partition, inline or on the reader pool;
//! 4. merge per-partition results in partition-id order and collect
//!    `failed_parts`.

pub mod lookup;
pub mod neighbors;
pub mod scan;

use crate::catalog::{MetaCatalog, SpaceInfo};
use crate::config::{Config, QueryConfig};
use crate::exec::{ExecError, RuntimeContext};
use crate::protocol::{
    ErrorCode, PartitionResult, RequestCommon, ResponseCommon, ScanCursor,
};
use crate::runtime::{KillChecker, ReaderPool};
use crate::store::KvStore;
use crate::value::Row;
use crate::PartitionId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Validation failure: the code for `failed_parts` plus the
/// human-readable sentence for semantic errors.
pub(crate) type Invalid = (ErrorCode, Option<String>);

/// What one partition produced.
pub(crate) type PartRun = Result<(Vec<Row>, Option<ScanCursor>), ExecError>;

/// The long-lived query engine: catalog snapshot, store handle, reader
/// pool, and the config knobs the processors consult per request.
pub struct QueryEngine {
    catalog: Arc<MetaCatalog>,
    store: Arc<dyn KvStore>,
    pool: ReaderPool,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(catalog: Arc<MetaCatalog>, store: Arc<dyn KvStore>, config: &Config) -> Self {
        QueryEngine {
            pool: ReaderPool::build(&config.query),
            config: config.query.clone(),
            catalog,
            store,
        }
    }

    pub fn catalog(&self) -> &Arc<MetaCatalog> {
        &self.catalog
    }

    pub(crate) fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Run `run` for every partition, inline or on the reader pool, and
    /// return the outcomes in the given partition order.
    pub(crate) fn execute_parts<F>(
        &self,
        common: &RequestCommon,
        parts: &[PartitionId],
        run: Arc<F>,
    ) -> Vec<(PartitionId, PartRun)>
    where
        F: Fn(PartitionId) -> PartRun + Send + Sync + 'static,
    {
        let concurrent =
            (common.concurrently || self.config.query_concurrently) && parts.len() > 1;
        if !concurrent {
            return parts.iter().map(|part| (*part, run(*part))).collect();
        }
        let (tx, rx) = crossbeam_channel::bounded(parts.len());
        for part in parts {
            let tx = tx.clone();
            let run = Arc::clone(&run);
            let part = *part;
            self.pool.spawn(move || {
                let _ = tx.send((part, run(part)));
            });
        }
        drop(tx);
        let mut finished: HashMap<PartitionId, PartRun> = rx.iter().collect();
        parts
            .iter()
            .map(|part| {
                let outcome = finished
                    .remove(part)
                    .unwrap_or(Err(ExecError::Code(ErrorCode::StorageError)));
                (*part, outcome)
            })
            .collect()
    }
}

/// The clones a partition closure captures so it can build runtime
/// contexts without borrowing the engine (`'static` requirement of the
/// reader pool). The kill checker's poll counter is partition-local, so
/// each call mints a fresh context.
pub(crate) struct EngineCtx {
    catalog: Arc<MetaCatalog>,
    store: Arc<dyn KvStore>,
    space: Arc<SpaceInfo>,
    session_id: i64,
    plan_id: i64,
    frequency: u32,
    ttl_override: Option<crate::schema::TtlInfo>,
}

impl EngineCtx {
    pub(crate) fn capture(
        engine: &QueryEngine,
        space: &Arc<SpaceInfo>,
        common: &RequestCommon,
    ) -> EngineCtx {
        EngineCtx {
            catalog: Arc::clone(&engine.catalog),
            store: Arc::clone(&engine.store),
            space: Arc::clone(space),
            session_id: common.session_id,
            plan_id: common.plan_id,
            frequency: engine.config.check_plan_killed_frequency,
            ttl_override: engine.config.mock_ttl(),
        }
    }

    pub(crate) fn runtime_context(&self) -> RuntimeContext {
        RuntimeContext {
            space: Arc::clone(&self.space),
            store: Arc::clone(&self.store),
            kill: KillChecker::new(
                Arc::clone(&self.catalog),
                self.session_id,
                self.plan_id,
                self.frequency,
            ),
            now: chrono::Utc::now().timestamp(),
            ttl_override: self.ttl_override.clone(),
        }
    }
}

/// Fail every requested partition with one code: the request-fatal shape.
pub(crate) fn fail_all(
    parts: impl IntoIterator<Item = PartitionId>,
    code: ErrorCode,
    error_msg: Option<String>,
) -> ResponseCommon {
    let failed_parts = parts
        .into_iter()
        .map(|part_id| PartitionResult { part_id, code })
        .collect();
    ResponseCommon { failed_parts, error_msg }
}

/// Fold per-partition outcomes into a response trailer plus the merged
/// rows (partition-id order) and per-partition cursors. A request-fatal
/// semantic error from any partition discards every row.
pub(crate) fn merge_outcomes(
    outcomes: Vec<(PartitionId, PartRun)>,
) -> Result<(ResponseCommon, Vec<(PartitionId, Vec<Row>, Option<ScanCursor>)>), (Vec<PartitionId>, String)>
{
    let all_parts: Vec<PartitionId> = outcomes.iter().map(|(part, _)| *part).collect();
    let mut result = ResponseCommon::default();
    let mut merged = Vec::with_capacity(outcomes.len());
    for (part, outcome) in outcomes {
        match outcome {
            Ok((rows, cursor)) => merged.push((part, rows, cursor)),
            Err(ExecError::Code(code)) => {
                debug!(part, ?code, "partition failed");
                result.failed_parts.push(PartitionResult { part_id: part, code });
            }
            Err(ExecError::Semantic(msg)) => return Err((all_parts, msg)),
        }
    }
    Ok((result, merged))
}
