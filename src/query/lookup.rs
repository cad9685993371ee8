//! Index-lookup processor.
//!
//! One plan per partition: an index scan plus output chain per query
//! context, a union fan-in, then top-N (when `order_by` is present) or a
//! plain limit, both applied per partition.

use super::{fail_all, merge_outcomes, EngineCtx, Invalid, QueryEngine};
use crate::catalog::SpaceInfo;
use crate::exec::index_node::{IndexOutputNode, IndexScanNode};
use crate::exec::node::{LimitNode, OutputNode, TopNNode, UnionNode};
use crate::exec::{PlanInput, StoragePlan};
use crate::expr::{decode_expression, fold, Expression};
use crate::index::IndexItem;
use crate::protocol::{
    ColumnHint, ErrorCode, LookupRequest, LookupResponse, OrderDirection, SchemaRef,
    K_DST, K_RANK, K_SRC, K_TAG, K_TYPE, K_VID,
};
use crate::value::DataSet;
use crate::PartitionId;
use std::sync::Arc;
use tracing::warn;

struct LookupTemplate {
    schema: SchemaRef,
    schema_name: String,
    return_columns: Vec<String>,
    contexts: Vec<(Arc<IndexItem>, Vec<ColumnHint>, Option<Expression>)>,
    /// `(column index, direction)` resolved against `return_columns`.
    order_by: Vec<(usize, OrderDirection)>,
    limit: Option<i64>,
}

pub fn lookup_index(engine: &QueryEngine, req: &LookupRequest) -> LookupResponse {
    let part_ids: Vec<PartitionId> = req.parts.clone();
    let Some(space) = engine.catalog().space(req.space_id) else {
        return LookupResponse {
            result: fail_all(part_ids, ErrorCode::SpaceNotFound, None),
            ..Default::default()
        };
    };

    let template = match build_template(&space, req) {
        Ok(template) => template,
        Err((code, msg)) => {
            warn!(space = req.space_id, ?code, "index lookup failed validation");
            return LookupResponse {
                result: fail_all(part_ids, code, msg),
                ..Default::default()
            };
        }
    };

    let mut dataset = DataSet::new(template.return_columns.clone());
    let template = Arc::new(template);
    let engine_ctx = EngineCtx::capture(engine, &space, &req.common);
    let run = {
        let template = Arc::clone(&template);
        Arc::new(move |part: PartitionId| {
            let ctx = engine_ctx.runtime_context();
            let mut plan = build_plan(&template);
            let outcome = plan.go(&ctx, part, PlanInput::None)?;
            Ok((outcome.rows, None))
        })
    };

    let outcomes = engine.execute_parts(&req.common, &part_ids, run);
    match merge_outcomes(outcomes) {
        Ok((result, merged)) => {
            for (_, rows, _) in merged {
                dataset.rows.extend(rows);
            }
            LookupResponse { result, data: dataset }
        }
        Err((all_parts, msg)) => LookupResponse {
            result: fail_all(all_parts, ErrorCode::SemanticError, Some(msg)),
            ..Default::default()
        },
    }
}

fn build_plan(template: &LookupTemplate) -> StoragePlan {
    let mut plan = StoragePlan::new();
    let mut chains = Vec::with_capacity(template.contexts.len());
    for (index, hints, residual) in &template.contexts {
        let scan = plan.add_node(Box::new(IndexScanNode {
            index: Arc::clone(index),
            hints: hints.clone(),
        }));
        let output = plan.add_node(Box::new(IndexOutputNode {
            schema: template.schema,
            schema_name: template.schema_name.clone(),
            return_columns: template.return_columns.clone(),
            residual: residual.clone(),
            dep: scan,
        }));
        plan.add_dependency(output, scan);
        chains.push(output);
    }
    let union = plan.add_node(Box::new(UnionNode { deps: chains.clone() }));
    for chain in chains {
        plan.add_dependency(union, chain);
    }
    let mut tail = union;
    if template.order_by.is_empty() {
        if let Some(limit) = template.limit {
            let node = plan.add_node(Box::new(LimitNode { dep: tail, n: limit.max(0) as usize }));
            plan.add_dependency(node, tail);
            tail = node;
        }
    } else {
        let n = match template.limit {
            Some(limit) => limit.max(0) as usize,
            None => usize::MAX,
        };
        let node = plan.add_node(Box::new(TopNNode {
            dep: tail,
            n,
            keys: template.order_by.clone(),
        }));
        plan.add_dependency(node, tail);
        tail = node;
    }
    let output = plan.add_node(Box::new(OutputNode { dep: tail }));
    plan.add_dependency(output, tail);
    plan.set_output(output);
    plan
}

fn build_template(space: &SpaceInfo, req: &LookupRequest) -> Result<LookupTemplate, Invalid> {
    // -- schema -------------------------------------------------------------
    let (schema, schema_name) = match req.schema {
        SchemaRef::Tag(tag) => {
            let meta = space.tag(tag).ok_or((ErrorCode::TagNotFound, None))?;
            (SchemaRef::Tag(tag), meta.name.clone())
        }
        SchemaRef::Edge(etype) => {
            let meta = space.edge(etype).ok_or((ErrorCode::EdgeNotFound, None))?;
            (SchemaRef::Edge(etype.abs()), meta.name.clone())
        }
    };

    // -- return columns -----------------------------------------------------
    if req.return_columns.is_empty() {
        return Err((
            ErrorCode::SemanticError,
            Some("lookup needs at least one return column".to_string()),
        ));
    }
    for column in &req.return_columns {
        let synthetic = match schema {
            SchemaRef::Tag(_) => column == K_VID || column == K_TAG,
            SchemaRef::Edge(_) => {
                column == K_SRC || column == K_DST || column == K_RANK || column == K_TYPE
            }
        };
        if synthetic {
            continue;
        }
        let known = match schema {
            SchemaRef::Tag(tag) => space
                .tag(tag)
                .is_some_and(|m| m.schema.latest().field(column).is_some()),
            SchemaRef::Edge(etype) => space
                .edge(etype)
                .is_some_and(|m| m.schema.latest().field(column).is_some()),
        };
        if !known {
            let code = match schema {
                SchemaRef::Tag(_) => ErrorCode::TagPropNotFound,
                SchemaRef::Edge(_) => ErrorCode::EdgePropNotFound,
            };
            return Err((code, None));
        }
    }

    // -- contexts -----------------------------------------------------------
    if req.contexts.is_empty() {
        return Err((
            ErrorCode::IndexNotFound,
            Some("lookup needs at least one index query context".to_string()),
        ));
    }
    let mut contexts = Vec::with_capacity(req.contexts.len());
    for ictx in &req.contexts {
        let index = space
            .index(ictx.index_id)
            .ok_or((ErrorCode::IndexNotFound, None))?;
        if index.schema != schema {
            return Err((ErrorCode::IndexNotFound, None));
        }
        // hints must bind a strict prefix of the index column order
        for (pos, hint) in ictx.column_hints.iter().enumerate() {
            match index.fields.get(pos) {
                Some(field) if field.name == hint.column_name => {}
                _ => {
                    return Err((
                        ErrorCode::SemanticError,
                        Some(format!(
                            "hint column '{}' does not match the index column order",
                            hint.column_name
                        )),
                    ))
                }
            }
        }
        let residual = match &ictx.filter {
            Some(encoded) => Some(prepare_residual(space, &schema_name, schema, encoded)?),
            None => None,
        };
        contexts.push((Arc::clone(index), ictx.column_hints.clone(), residual));
    }

    // -- order by -----------------------------------------------------------
    let mut order_by = Vec::with_capacity(req.order_by.len());
    for order in &req.order_by {
        let col = req
            .return_columns
            .iter()
            .position(|c| *c == order.prop)
            .ok_or((
                ErrorCode::SemanticError,
                Some(format!("order by column '{}' is not returned", order.prop)),
            ))?;
        order_by.push((col, order.direction));
    }

    Ok(LookupTemplate {
        schema,
        schema_name,
        return_columns: req.return_columns.clone(),
        contexts,
        order_by,
        limit: req.limit,
    })
}

/// Residual filters reference the looked-up schema by name; resolve and
/// fold once per request.
fn prepare_residual(
    space: &SpaceInfo,
    schema_name: &str,
    schema: SchemaRef,
    encoded: &[u8],
) -> Result<Expression, Invalid> {
    let decoded = decode_expression(encoded)
        .map_err(|e| (ErrorCode::SemanticError, Some(e.to_string())))?;
    let resolved = decoded
        .resolve_labels(&|label, attr| {
            if label != schema_name {
                return None;
            }
            Some(match schema {
                SchemaRef::Tag(_) => Expression::TagProperty {
                    tag: label.to_string(),
                    prop: attr.to_string(),
                },
                SchemaRef::Edge(_) => Expression::EdgeProperty {
                    edge: label.to_string(),
                    prop: attr.to_string(),
                },
            })
        })
        .ok_or((
            ErrorCode::SemanticError,
            Some(format!("residual filter references more than '{schema_name}'")),
        ))?;
    super::neighbors::validate_prop_refs(space, &resolved)?;
    fold(&resolved).map_err(|e| (ErrorCode::SemanticError, Some(e.to_string())))
}
