//! Neighbor-traversal processor.
//!
//! Validates the traverse spec against the catalog, resolves and folds
//! the filter and stat expressions once, then runs one expansion plan per
//! partition: tag nodes and edge nodes fanning into the kernel, one
//! output row per source vid.

use super::{fail_all, merge_outcomes, EngineCtx, Invalid, QueryEngine};
use crate::catalog::SpaceInfo;
use crate::exec::neighbor::{EdgeSpec, NeighborNode, StatSpec, TagSpec};
use crate::exec::{edge_node::EdgeNode, tag_node::TagNode, PlanInput, StoragePlan};
use crate::expr::{decode_expression, fold, Expression};
use crate::keys;
use crate::protocol::{
    EdgeDirection, ErrorCode, NeighborsRequest, NeighborsResponse, StatType, TraverseSpec,
    K_EXPR, K_STATS, K_TAG, K_VID,
};
use crate::value::DataSet;
use crate::{EdgeType, PartitionId, TagId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
struct TagCol {
    tag_id: TagId,
    name: String,
    props: Vec<String>,
    emit_column: bool,
}

#[derive(Clone)]
struct EdgeCol {
    etype: EdgeType,
    abs_name: String,
    props: Vec<String>,
}

/// Everything a partition task needs to build its plan; immutable and
/// shared across partitions.
struct NeighborTemplate {
    tag_cols: Vec<TagCol>,
    edge_cols: Vec<EdgeCol>,
    stats: Vec<(Expression, StatType)>,
    filter: Option<Arc<Expression>>,
    limit: Option<i64>,
    random: bool,
    column_names: Vec<String>,
}

pub fn get_neighbors(engine: &QueryEngine, req: &NeighborsRequest) -> NeighborsResponse {
    let part_ids: Vec<PartitionId> = req.parts.keys().copied().collect();
    let Some(space) = engine.catalog().space(req.space_id) else {
        return NeighborsResponse {
            result: fail_all(part_ids, ErrorCode::SpaceNotFound, None),
            vertices: None,
        };
    };

    let template = match build_template(engine, &space, &req.traverse_spec) {
        Ok(template) => template,
        Err((code, msg)) => {
            warn!(space = req.space_id, ?code, "neighbor request failed validation");
            return NeighborsResponse { result: fail_all(part_ids, code, msg), vertices: None };
        }
    };

    // Fixed-width source vids per partition.
    let mut parts: BTreeMap<PartitionId, Vec<Vec<u8>>> = BTreeMap::new();
    for (part, vids) in &req.parts {
        let mut fixed = Vec::with_capacity(vids.len());
        for vid in vids {
            match keys::fixed_vid(vid, space.vid_len) {
                Some(v) => fixed.push(v),
                None => {
                    let msg = format!(
                        "vid of {} bytes exceeds the space vid length {}",
                        vid.len(),
                        space.vid_len
                    );
                    return NeighborsResponse {
                        result: fail_all(part_ids, ErrorCode::SemanticError, Some(msg)),
                        vertices: None,
                    };
                }
            }
        }
        parts.insert(*part, fixed);
    }

    let mut dataset = DataSet::new(template.column_names.clone());
    if template.limit == Some(0) {
        // limit 0 returns the shape with no rows, every partition succeeds
        return NeighborsResponse {
            result: crate::protocol::ResponseCommon::default(),
            vertices: Some(dataset),
        };
    }

    let template = Arc::new(template);
    let parts_map = Arc::new(parts);
    let run = {
        let template = Arc::clone(&template);
        let parts_map = Arc::clone(&parts_map);
        let space = Arc::clone(&space);
        let engine_ctx = EngineCtx::capture(engine, &space, &req.common);
        Arc::new(move |part: PartitionId| {
            let ctx = engine_ctx.runtime_context();
            let mut plan = build_plan(&template);
            let mut rows = Vec::new();
            if let Some(vids) = parts_map.get(&part) {
                for vid in vids {
                    let outcome = plan.go(&ctx, part, PlanInput::Vid(vid.clone()))?;
                    rows.extend(outcome.rows);
                }
            }
            Ok((rows, None))
        })
    };

    let outcomes = engine.execute_parts(&req.common, &part_ids, run);
    match merge_outcomes(outcomes) {
        Ok((result, merged)) => {
            for (_, rows, _) in merged {
                dataset.rows.extend(rows);
            }
            NeighborsResponse { result, vertices: Some(dataset) }
        }
        Err((all_parts, msg)) => NeighborsResponse {
            result: fail_all(all_parts, ErrorCode::SemanticError, Some(msg)),
            vertices: None,
        },
    }
}

fn build_plan(template: &NeighborTemplate) -> StoragePlan {
    let mut plan = StoragePlan::new();
    let mut tag_specs = Vec::with_capacity(template.tag_cols.len());
    for col in &template.tag_cols {
        let node = plan.add_node(Box::new(TagNode::new(col.tag_id, &col.name)));
        tag_specs.push(TagSpec {
            tag_id: col.tag_id,
            name: col.name.clone(),
            props: col.props.clone(),
            emit_column: col.emit_column,
            node,
        });
    }
    let mut edge_specs = Vec::with_capacity(template.edge_cols.len());
    for col in &template.edge_cols {
        let node = plan.add_node(Box::new(EdgeNode::new(col.etype)));
        edge_specs.push(EdgeSpec {
            etype: col.etype,
            abs_name: col.abs_name.clone(),
            props: col.props.clone(),
            filter: template.filter.clone(),
            node,
        });
    }
    let deps: Vec<_> = tag_specs
        .iter()
        .map(|s| s.node)
        .chain(edge_specs.iter().map(|s| s.node))
        .collect();
    let neighbor = plan.add_node(Box::new(NeighborNode {
        tag_specs,
        edge_specs,
        stat_specs: template
            .stats
            .iter()
            .map(|(expr, stat)| StatSpec { expr: expr.clone(), stat: *stat })
            .collect(),
        limit: template.limit,
        random: template.random,
    }));
    for dep in deps {
        plan.add_dependency(neighbor, dep);
    }
    plan.set_output(neighbor);
    plan
}

fn build_template(
    engine: &QueryEngine,
    space: &Arc<SpaceInfo>,
    spec: &TraverseSpec,
) -> Result<NeighborTemplate, Invalid> {
    // -- tag columns --------------------------------------------------------
    let mut tag_cols = Vec::new();
    for vprop in &spec.vertex_props {
        let meta = space
            .tag(vprop.tag)
            .ok_or((ErrorCode::TagNotFound, None))?;
        let props = expand_tag_props(meta, &vprop.props)?;
        tag_cols.push(TagCol {
            tag_id: vprop.tag,
            name: meta.name.clone(),
            props,
            emit_column: true,
        });
    }

    // -- edge columns -------------------------------------------------------
    let mut edge_cols = Vec::new();
    if spec.edge_props.is_empty() {
        for etype in expand_edge_types(space, &spec.edge_types, spec.edge_direction) {
            let meta = space.edge(etype).ok_or((ErrorCode::EdgeNotFound, None))?;
            let props = meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect();
            edge_cols.push(EdgeCol { etype, abs_name: meta.name.clone(), props });
        }
    } else {
        for eprop in &spec.edge_props {
            let meta = space
                .edge(eprop.edge)
                .ok_or((ErrorCode::EdgeNotFound, None))?;
            let props = expand_edge_props(meta, &eprop.props)?;
            edge_cols.push(EdgeCol { etype: eprop.edge, abs_name: meta.name.clone(), props });
        }
    }

    // -- filter and stats ---------------------------------------------------
    let filter = match &spec.filter {
        Some(encoded) => Some(Arc::new(prepare_expression(space, encoded)?)),
        None => None,
    };
    let mut stats = Vec::new();
    for stat in &spec.stat_props {
        let expr = prepare_expression(space, &stat.expression)?;
        stats.push((expr, stat.stat));
    }

    // Tags the expressions reference beyond the requested columns are
    // fetched but not emitted.
    let mut referenced: BTreeSet<String> = BTreeSet::new();
    if let Some(filter) = &filter {
        collect_tag_refs(filter, &mut referenced);
    }
    for (expr, _) in &stats {
        collect_tag_refs(expr, &mut referenced);
    }
    for name in referenced {
        if tag_cols.iter().any(|c| c.name == name) {
            continue;
        }
        let meta = space
            .tag_by_name(&name)
            .ok_or((ErrorCode::TagNotFound, None))?;
        tag_cols.push(TagCol {
            tag_id: meta.id,
            name,
            props: Vec::new(),
            emit_column: false,
        });
    }

    // -- limit --------------------------------------------------------------
    let cap = engine.config().max_edge_returned_per_vertex;
    let limit = match (spec.limit, cap > 0) {
        (Some(l), true) => Some(l.min(cap)),
        (Some(l), false) => Some(l),
        (None, true) => Some(cap),
        (None, false) => None,
    };
    if matches!(limit, Some(l) if l < 0) {
        return Err((ErrorCode::SemanticError, Some("limit must be >= 0".to_string())));
    }

    // -- response columns ---------------------------------------------------
    let mut column_names = vec![K_VID.to_string(), K_STATS.to_string()];
    for col in &tag_cols {
        if !col.emit_column {
            continue;
        }
        let mut name = format!("{}:{}", K_TAG, col.tag_id);
        for prop in &col.props {
            name.push(':');
            name.push_str(prop);
        }
        column_names.push(name);
    }
    for col in &edge_cols {
        let sign = if col.etype >= 0 { '+' } else { '-' };
        let mut name = format!("_edge:{sign}{}", col.etype.abs());
        for prop in &col.props {
            name.push(':');
            name.push_str(prop);
        }
        column_names.push(name);
    }
    column_names.push(K_EXPR.to_string());

    Ok(NeighborTemplate {
        tag_cols,
        edge_cols,
        stats,
        filter,
        limit,
        random: spec.random,
        column_names,
    })
}

/// Expand an edge-type list that may be empty (= every type of the space
/// in the requested direction): ascending absolute id, positive first.
fn expand_edge_types(
    space: &SpaceInfo,
    requested: &[EdgeType],
    direction: EdgeDirection,
) -> Vec<EdgeType> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    let mut types = Vec::new();
    for id in space.edge_type_ids() {
        match direction {
            EdgeDirection::Out => types.push(id),
            EdgeDirection::In => types.push(-id),
            EdgeDirection::Both => {
                types.push(id);
                types.push(-id);
            }
        }
    }
    types
}

/// `None` = bare presence (no props); `Some([])` = every property.
fn expand_tag_props(
    meta: &crate::catalog::TagMeta,
    props: &Option<Vec<String>>,
) -> Result<Vec<String>, Invalid> {
    match props {
        None => Ok(Vec::new()),
        Some(list) if list.is_empty() => {
            Ok(meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect())
        }
        Some(list) => {
            for prop in list {
                let synthetic = prop == K_VID || prop == K_TAG;
                if !synthetic && meta.schema.latest().field(prop).is_none() {
                    return Err((ErrorCode::TagPropNotFound, None));
                }
            }
            Ok(list.clone())
        }
    }
}

fn expand_edge_props(
    meta: &crate::catalog::EdgeMeta,
    props: &Option<Vec<String>>,
) -> Result<Vec<String>, Invalid> {
    use crate::protocol::{K_DST, K_RANK, K_SRC, K_TYPE};
    match props {
        None => Ok(Vec::new()),
        Some(list) if list.is_empty() => {
            Ok(meta.schema.latest().fields.iter().map(|f| f.name.clone()).collect())
        }
        Some(list) => {
            for prop in list {
                let synthetic =
                    prop == K_SRC || prop == K_DST || prop == K_RANK || prop == K_TYPE;
                if !synthetic && meta.schema.latest().field(prop).is_none() {
                    return Err((ErrorCode::EdgePropNotFound, None));
                }
            }
            Ok(list.clone())
        }
    }
}

/// Decode, resolve labels against the space, validate property
/// references, and constant-fold - once per request.
fn prepare_expression(space: &SpaceInfo, encoded: &[u8]) -> Result<Expression, Invalid> {
    let decoded = decode_expression(encoded)
        .map_err(|e| (ErrorCode::SemanticError, Some(e.to_string())))?;
    let resolved = resolve_labels(space, &decoded)?;
    validate_prop_refs(space, &resolved)?;
    fold(&resolved).map_err(|e| (ErrorCode::SemanticError, Some(e.to_string())))
}

/// `label.attr` resolves to an edge property when the label names an edge
/// type, else to a tag property. Edge wins when a name is both.
pub(crate) fn resolve_labels(
    space: &SpaceInfo,
    expr: &Expression,
) -> Result<Expression, Invalid> {
    // surface the failing label before rewriting
    let mut unknown: Option<String> = None;
    expr.visit(&mut |node| {
        if let Expression::LabelAttribute { label, .. } = node {
            if unknown.is_none()
                && space.edge_by_name(label).is_none()
                && space.tag_by_name(label).is_none()
            {
                unknown = Some(label.clone());
            }
        }
    });
    if let Some(label) = unknown {
        return Err((
            ErrorCode::SemanticError,
            Some(format!("Unknown tag or edge name: {label}")),
        ));
    }
    expr.resolve_labels(&|label, attr| {
        if space.edge_by_name(label).is_some() {
            Some(Expression::EdgeProperty { edge: label.to_string(), prop: attr.to_string() })
        } else {
            space.tag_by_name(label).map(|_| Expression::TagProperty {
                tag: label.to_string(),
                prop: attr.to_string(),
            })
        }
    })
    .ok_or((ErrorCode::SemanticError, Some("unresolvable filter".to_string())))
}

/// Every property reference must exist in its schema.
pub(crate) fn validate_prop_refs(space: &SpaceInfo, expr: &Expression) -> Result<(), Invalid> {
    let mut invalid: Option<Invalid> = None;
    expr.visit(&mut |node| {
        if invalid.is_some() {
            return;
        }
        match node {
            Expression::DstProperty { .. } => {
                // the destination vertex lives in its own partition,
                // possibly on another host
                invalid = Some((
                    ErrorCode::SemanticError,
                    Some(
                        "destination vertex properties cannot be evaluated in the storage layer"
                            .to_string(),
                    ),
                ));
            }
            Expression::TagProperty { tag, prop }
            | Expression::SrcProperty { tag, prop } => match space.tag_by_name(tag) {
                None => invalid = Some((ErrorCode::TagNotFound, None)),
                Some(meta) => {
                    if meta.schema.latest().field(prop).is_none() {
                        invalid = Some((ErrorCode::TagPropNotFound, None));
                    }
                }
            },
            Expression::EdgeProperty { edge, prop } => match space.edge_by_name(edge) {
                None => invalid = Some((ErrorCode::EdgeNotFound, None)),
                Some(meta) => {
                    if meta.schema.latest().field(prop).is_none() {
                        invalid = Some((ErrorCode::EdgePropNotFound, None));
                    }
                }
            },
            Expression::EdgeSrc { edge }
            | Expression::EdgeDst { edge }
            | Expression::EdgeTypeOf { edge }
            | Expression::EdgeRank { edge } => {
                if space.edge_by_name(edge).is_none() {
                    invalid = Some((ErrorCode::EdgeNotFound, None));
                }
            }
            _ => {}
        }
    });
    match invalid {
        Some(invalid) => Err(invalid),
        None => Ok(()),
    }
}

/// Tag names an expression reads (tag- and source-property leaves).
fn collect_tag_refs(expr: &Expression, out: &mut BTreeSet<String>) {
    expr.visit(&mut |node| {
        if let Expression::TagProperty { tag, .. } | Expression::SrcProperty { tag, .. } = node {
            out.insert(tag.clone());
        }
    });
}
