//! Neighbor expansion kernel: one output row per source vertex.
//!
//! Consumes the tag nodes and edge nodes it depends on and shapes the
//! response row: `[vid, stats, tag columns.., edge list columns.., _expr]`.
//! Per edge it evaluates the per-type filter, feeds the statistic
//! aggregators (post-filter only), and applies the cross-type limit or
//! reservoir sample.

use super::plan::{ExecState, NodeId, NodeOutput, RelNode};
use super::{
    find_prop, EdgeRow, ExecResult, PropMap, RuntimeContext, StatAccumulator, StorageExprContext,
};
use crate::expr::{eval, Expression};
use crate::keys;
use crate::protocol::{StatType, K_DST, K_RANK, K_SRC, K_TYPE};
use crate::value::{Row, Value};
use crate::{EdgeType, TagId};
use rand::Rng;
use std::sync::Arc;

/// One tag read feeding the kernel. `props` is already expanded: empty
/// means bare existence, otherwise the concrete projection list. Tags
/// fetched only because the filter references them carry
/// `emit_column = false` and produce no response column.
pub struct TagSpec {
    pub tag_id: TagId,
    pub name: String,
    pub props: Vec<String>,
    pub emit_column: bool,
    pub node: NodeId,
}

/// One requested edge column (signed type). `filter` is the per-type
/// filter subexpression; property resolution inside it strips the sign,
/// so a filter authored against the forward name applies to reverse
/// iteration unchanged.
pub struct EdgeSpec {
    pub etype: EdgeType,
    pub abs_name: String,
    pub props: Vec<String>,
    pub filter: Option<Arc<Expression>>,
    pub node: NodeId,
}

/// One per-edge statistic, evaluated post-filter and folded across the
/// source's emitted edges. The request-side alias stays in the protocol
/// layer; the `_stats` column is positional.
pub struct StatSpec {
    pub expr: Expression,
    pub stat: StatType,
}

pub struct NeighborNode {
    pub tag_specs: Vec<TagSpec>,
    pub edge_specs: Vec<EdgeSpec>,
    pub stat_specs: Vec<StatSpec>,
    /// Cross-type edge cap, already clamped by
    /// `max_edge_returned_per_vertex`. `None` = unbounded.
    pub limit: Option<i64>,
    /// Reservoir-sample instead of truncating when the limit applies.
    pub random: bool,
}

impl RelNode for NeighborNode {
    fn name(&self) -> &'static str {
        "NeighborNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        let vid = state.vid()?;

        let tags: Vec<(String, Option<PropMap>)> = self
            .tag_specs
            .iter()
            .map(|spec| {
                let row = match &state.outputs[spec.node] {
                    NodeOutput::TagRow(row) => row.clone(),
                    _ => None,
                };
                (spec.name.clone(), row)
            })
            .collect();

        let mut stats: Vec<StatAccumulator> = self.stat_specs.iter().map(|_| StatAccumulator::default()).collect();
        let mut edge_lists: Vec<Vec<Value>> = self.edge_specs.iter().map(|_| Vec::new()).collect();

        if self.random {
            self.sample_edges(ctx, state, vid, &tags, &mut stats, &mut edge_lists)?;
        } else {
            self.truncate_edges(ctx, state, vid, &tags, &mut stats, &mut edge_lists)?;
        }

        let mut values = Vec::with_capacity(3 + tags.len() + edge_lists.len());
        values.push(Value::Str(
            String::from_utf8_lossy(keys::trim_vid(vid)).into_owned(),
        ));
        if self.stat_specs.is_empty() {
            values.push(Value::Empty);
        } else {
            values.push(Value::List(
                self.stat_specs
                    .iter()
                    .zip(&stats)
                    .map(|(spec, acc)| acc.finish(spec.stat))
                    .collect(),
            ));
        }
        for (spec, (_, props)) in self.tag_specs.iter().zip(&tags) {
            if !spec.emit_column {
                continue;
            }
            values.push(match props {
                None => Value::Empty,
                Some(props) => Value::List(
                    spec.props
                        .iter()
                        .map(|name| match name.as_str() {
                            crate::protocol::K_VID => Value::Str(
                                String::from_utf8_lossy(keys::trim_vid(vid)).into_owned(),
                            ),
                            crate::protocol::K_TAG => Value::Int(i64::from(spec.tag_id)),
                            prop => find_prop(props, prop).unwrap_or(Value::Empty),
                        })
                        .collect(),
                ),
            });
        }
        for list in edge_lists {
            values.push(Value::List(list));
        }
        values.push(Value::Empty);
        Ok(NodeOutput::Rows(vec![Row::new(values)]))
    }
}

impl NeighborNode {
    fn edge_passes(
        &self,
        ctx: &RuntimeContext,
        state: &ExecState,
        vid: &[u8],
        tags: &[(String, Option<PropMap>)],
        spec: &EdgeSpec,
        edge: &EdgeRow,
    ) -> ExecResult<bool> {
        let Some(filter) = &spec.filter else {
            return Ok(true);
        };
        let expr_ctx = StorageExprContext {
            ctx,
            part: state.part,
            vid,
            tags,
            edge: Some(edge),
            edge_name: &spec.abs_name,
        };
        Ok(eval(filter, &expr_ctx)?.is_true())
    }

    fn feed_stats(
        &self,
        ctx: &RuntimeContext,
        state: &ExecState,
        vid: &[u8],
        tags: &[(String, Option<PropMap>)],
        spec: &EdgeSpec,
        edge: &EdgeRow,
        stats: &mut [StatAccumulator],
    ) -> ExecResult<()> {
        let expr_ctx = StorageExprContext {
            ctx,
            part: state.part,
            vid,
            tags,
            edge: Some(edge),
            edge_name: &spec.abs_name,
        };
        for (stat_spec, acc) in self.stat_specs.iter().zip(stats.iter_mut()) {
            let value = eval(&stat_spec.expr, &expr_ctx)?;
            acc.feed(&value);
        }
        Ok(())
    }

    fn project_edge(&self, spec: &EdgeSpec, edge: &EdgeRow) -> Value {
        Value::List(
            spec.props
                .iter()
                .map(|name| match name.as_str() {
                    K_SRC => Value::Str(
                        String::from_utf8_lossy(keys::trim_vid(&edge.src)).into_owned(),
                    ),
                    K_DST => Value::Str(
                        String::from_utf8_lossy(keys::trim_vid(&edge.dst)).into_owned(),
                    ),
                    K_RANK => Value::Int(edge.rank),
                    K_TYPE => Value::Int(i64::from(edge.etype)),
                    prop => find_prop(&edge.props, prop).unwrap_or(Value::Empty),
                })
                .collect(),
        )
    }

    /// `random = false`: emit in type order until the cross-type budget is
    /// exhausted; stats stop with emission.
    fn truncate_edges(
        &self,
        ctx: &RuntimeContext,
        state: &ExecState,
        vid: &[u8],
        tags: &[(String, Option<PropMap>)],
        stats: &mut [StatAccumulator],
        edge_lists: &mut [Vec<Value>],
    ) -> ExecResult<()> {
        let mut budget = self.limit;
        'specs: for (idx, spec) in self.edge_specs.iter().enumerate() {
            if budget == Some(0) {
                break;
            }
            let NodeOutput::Edges(edges) = &state.outputs[spec.node] else {
                continue;
            };
            for edge in edges {
                ctx.check_killed()?;
                if !self.edge_passes(ctx, state, vid, tags, spec, edge)? {
                    continue;
                }
                self.feed_stats(ctx, state, vid, tags, spec, edge, stats)?;
                edge_lists[idx].push(self.project_edge(spec, edge));
                if let Some(left) = &mut budget {
                    *left -= 1;
                    if *left == 0 {
                        break 'specs;
                    }
                }
            }
        }
        Ok(())
    }

    /// `random = true`: every passing edge feeds the stats; emission is a
    /// size-`limit` reservoir across all types, regrouped by type with
    /// iteration order preserved inside each slot.
    fn sample_edges(
        &self,
        ctx: &RuntimeContext,
        state: &ExecState,
        vid: &[u8],
        tags: &[(String, Option<PropMap>)],
        stats: &mut [StatAccumulator],
        edge_lists: &mut [Vec<Value>],
    ) -> ExecResult<()> {
        let capacity = match self.limit {
            Some(limit) if limit >= 0 => limit as usize,
            _ => usize::MAX,
        };
        let mut reservoir: Vec<(usize, u64, Value)> = Vec::new();
        let mut seen: u64 = 0;
        let mut rng = rand::thread_rng();
        for (idx, spec) in self.edge_specs.iter().enumerate() {
            let NodeOutput::Edges(edges) = &state.outputs[spec.node] else {
                continue;
            };
            for edge in edges {
                ctx.check_killed()?;
                if !self.edge_passes(ctx, state, vid, tags, spec, edge)? {
                    continue;
                }
                self.feed_stats(ctx, state, vid, tags, spec, edge, stats)?;
                let projected = self.project_edge(spec, edge);
                if reservoir.len() < capacity {
                    reservoir.push((idx, seen, projected));
                } else if capacity > 0 {
                    let slot = rng.gen_range(0..=seen);
                    if (slot as usize) < capacity {
                        reservoir[slot as usize] = (idx, seen, projected);
                    }
                }
                seen += 1;
            }
        }
        reservoir.sort_by_key(|(idx, seq, _)| (*idx, *seq));
        for (idx, _, value) in reservoir {
            edge_lists[idx].push(value);
        }
        Ok(())
    }
}
