//! Vertex and edge scan processors.
//!
//! Whole-partition scans with per-partition limits, time bounds, and
//! cursor-based resumption. Cursors are opaque blobs minted against the
//! current catalog version; a stale or corrupt cursor fails only its own
//! partition with `INVALID_CURSOR`.

use super::{fail_all, merge_outcomes, EngineCtx, Invalid, QueryEngine};
use crate::catalog::SpaceInfo;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::exec::node::OutputNode;
use crate::exec::scan_node::{ScanEdgeNode, ScanEdgeSpec, ScanTagSpec, ScanVertexNode};
use crate::exec::{PlanInput, StoragePlan};
use crate::protocol::{
    EdgeProp, ErrorCode, PartitionResult, ScanCursor, ScanEdgeRequest, ScanResponse,
    ScanVertexRequest, VertexProp, K_DST, K_RANK, K_SRC, K_TYPE, K_VID,
};
use crate::value::DataSet;
use crate::PartitionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub fn scan_vertices(engine: &QueryEngine, req: &ScanVertexRequest) -> ScanResponse {
    let part_ids: Vec<PartitionId> = req.parts.keys().copied().collect();
    let Some(space) = engine.catalog().space(req.space_id) else {
        return ScanResponse {
            result: fail_all(part_ids, ErrorCode::SpaceNotFound, None),
            ..Default::default()
        };
    };

    let (specs, columns) = match vertex_columns(&space, &req.return_columns) {
        Ok(built) => built,
        Err((code, msg)) => {
            warn!(space = req.space_id, ?code, "vertex scan failed validation");
            return ScanResponse {
                result: fail_all(part_ids, code, msg),
                ..Default::default()
            };
        }
    };

    let template = Arc::new(VertexScanTemplate {
        specs,
        limit: effective_limit(req.limit),
        start_time: req.start_time,
        end_time: req.end_time,
    });
    let plan_for = move |_part: PartitionId| build_vertex_plan(&template);
    run_scan(engine, &space, &req.common, &req.parts, columns, plan_for)
}

pub fn scan_edges(engine: &QueryEngine, req: &ScanEdgeRequest) -> ScanResponse {
    let part_ids: Vec<PartitionId> = req.parts.keys().copied().collect();
    let Some(space) = engine.catalog().space(req.space_id) else {
        return ScanResponse {
            result: fail_all(part_ids, ErrorCode::SpaceNotFound, None),
            ..Default::default()
        };
    };

    let (specs, columns) = match edge_columns(&space, &req.return_columns) {
        Ok(built) => built,
        Err((code, msg)) => {
            warn!(space = req.space_id, ?code, "edge scan failed validation");
            return ScanResponse {
                result: fail_all(part_ids, code, msg),
                ..Default::default()
            };
        }
    };

    let template = Arc::new(EdgeScanTemplate {
        specs,
        limit: effective_limit(req.limit),
        start_time: req.start_time,
        end_time: req.end_time,
    });
    let plan_for = move |_part: PartitionId| build_edge_plan(&template);
    run_scan(engine, &space, &req.common, &req.parts, columns, plan_for)
}

struct VertexScanTemplate {
    specs: Vec<(crate::TagId, String, Vec<String>)>,
    limit: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
}

struct EdgeScanTemplate {
    specs: Vec<(crate::EdgeType, String, Vec<String>)>,
    limit: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
}

fn build_vertex_plan(template: &VertexScanTemplate) -> StoragePlan {
    let mut plan = StoragePlan::new();
    let scan = plan.add_node(Box::new(ScanVertexNode {
        tag_specs: template
            .specs
            .iter()
            .map(|(tag_id, name, props)| ScanTagSpec {
                tag_id: *tag_id,
                name: name.clone(),
                props: props.clone(),
            })
            .collect(),
        limit: template.limit,
        start_time: template.start_time,
        end_time: template.end_time,
    }));
    let output = plan.add_node(Box::new(OutputNode { dep: scan }));
    plan.add_dependency(output, scan);
    plan.set_output(output);
    plan
}

fn build_edge_plan(template: &EdgeScanTemplate) -> StoragePlan {
    let mut plan = StoragePlan::new();
    let scan = plan.add_node(Box::new(ScanEdgeNode {
        edge_specs: template
            .specs
            .iter()
            .map(|(etype, name, props)| ScanEdgeSpec {
                etype: *etype,
                name: name.clone(),
                props: props.clone(),
            })
            .collect(),
        limit: template.limit,
        start_time: template.start_time,
        end_time: template.end_time,
    }));
    let output = plan.add_node(Box::new(OutputNode { dep: scan }));
    plan.add_dependency(output, scan);
    plan.set_output(output);
    plan
}

/// Shared scan driver: decode cursors, run one plan per partition, merge
/// rows in partition order, and mint response cursors.
fn run_scan<Plan>(
    engine: &QueryEngine,
    space: &Arc<SpaceInfo>,
    common: &crate::protocol::RequestCommon,
    parts: &BTreeMap<PartitionId, ScanCursor>,
    columns: Vec<String>,
    plan_for: Plan,
) -> ScanResponse
where
    Plan: Fn(PartitionId) -> StoragePlan + Send + Sync + 'static,
{
    let catalog_version = engine.catalog().version();
    let mut response = ScanResponse { props: DataSet::new(columns), ..Default::default() };

    // Decode request cursors up front; a bad cursor fails only its part.
    let mut runnable: Vec<PartitionId> = Vec::new();
    let mut starts: BTreeMap<PartitionId, Option<Vec<u8>>> = BTreeMap::new();
    for (part, cursor) in parts {
        match &cursor.next_cursor {
            // absent or empty both mean "start at the partition prefix"
            None => {
                starts.insert(*part, None);
                runnable.push(*part);
            }
            Some(blob) if blob.is_empty() => {
                starts.insert(*part, None);
                runnable.push(*part);
            }
            Some(blob) => match decode_cursor(blob, catalog_version) {
                Ok(key) => {
                    starts.insert(*part, Some(key));
                    runnable.push(*part);
                }
                Err(e) => {
                    warn!(part, error = %e, "rejecting scan cursor");
                    response
                        .result
                        .failed_parts
                        .push(PartitionResult { part_id: *part, code: ErrorCode::InvalidCursor });
                }
            },
        }
    }

    let engine_ctx = EngineCtx::capture(engine, space, common);
    let starts = Arc::new(starts);
    let run = {
        let starts = Arc::clone(&starts);
        Arc::new(move |part: PartitionId| {
            let ctx = engine_ctx.runtime_context();
            let mut plan = plan_for(part);
            let input = PlanInput::Cursor(starts.get(&part).cloned().flatten());
            let outcome = plan.go(&ctx, part, input)?;
            Ok((outcome.rows, outcome.cursor))
        })
    };

    let outcomes = engine.execute_parts(common, &runnable, run);
    match merge_outcomes(outcomes) {
        Ok((result, merged)) => {
            response.result.failed_parts.extend(result.failed_parts);
            for (part, rows, cursor) in merged {
                response.props.rows.extend(rows);
                let cursor = cursor.unwrap_or_default();
                response.cursors.insert(
                    part,
                    ScanCursor {
                        has_next: cursor.has_next,
                        next_cursor: cursor
                            .next_cursor
                            .map(|key| encode_cursor(catalog_version, &key)),
                    },
                );
            }
            response
        }
        Err((all_parts, msg)) => ScanResponse {
            result: fail_all(all_parts, ErrorCode::SemanticError, Some(msg)),
            ..Default::default()
        },
    }
}

fn effective_limit(limit: i64) -> i64 {
    if limit <= 0 {
        i64::MAX
    } else {
        limit
    }
}

type VertexCols = (Vec<(crate::TagId, String, Vec<String>)>, Vec<String>);

fn vertex_columns(space: &SpaceInfo, return_columns: &[VertexProp]) -> Result<VertexCols, Invalid> {
    if return_columns.is_empty() {
        return Err((
            ErrorCode::SemanticError,
            Some("vertex scan needs at least one return column".to_string()),
        ));
    }
    let mut specs = Vec::new();
    let mut columns = vec![K_VID.to_string()];
    for vprop in return_columns {
        let meta = space.tag(vprop.tag).ok_or((ErrorCode::TagNotFound, None))?;
        let props: Vec<String> = match &vprop.props {
            None => meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect(),
            Some(list) if list.is_empty() => {
                meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect()
            }
            Some(list) => {
                for prop in list {
                    if meta.schema.latest().field(prop).is_none() {
                        return Err((ErrorCode::TagPropNotFound, None));
                    }
                }
                list.clone()
            }
        };
        for prop in &props {
            columns.push(format!("{}.{prop}", meta.name));
        }
        specs.push((vprop.tag, meta.name.clone(), props));
    }
    Ok((specs, columns))
}

type EdgeCols = (Vec<(crate::EdgeType, String, Vec<String>)>, Vec<String>);

fn edge_columns(space: &SpaceInfo, return_columns: &[EdgeProp]) -> Result<EdgeCols, Invalid> {
    if return_columns.is_empty() {
        return Err((
            ErrorCode::SemanticError,
            Some("edge scan needs at least one return column".to_string()),
        ));
    }
    let mut specs = Vec::new();
    let mut columns = Vec::new();
    for eprop in return_columns {
        let meta = space.edge(eprop.edge).ok_or((ErrorCode::EdgeNotFound, None))?;
        let props: Vec<String> = match &eprop.props {
            None => meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect(),
            Some(list) if list.is_empty() => {
                meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect()
            }
            Some(list) => {
                for prop in list {
                    let synthetic =
                        prop == K_SRC || prop == K_DST || prop == K_RANK || prop == K_TYPE;
                    if !synthetic && meta.schema.latest().field(prop).is_none() {
                        return Err((ErrorCode::EdgePropNotFound, None));
                    }
                }
                list.clone()
            }
        };
        for prop in &props {
            columns.push(format!("{}.{prop}", meta.name));
        }
        specs.push((eprop.edge, meta.name.clone(), props));
    }
    Ok((specs, columns))
}
