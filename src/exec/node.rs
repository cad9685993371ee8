//! Generic row-shaped nodes: filter, limit, top-N, aggregate, output.
//!
//! These operate on a dependency's materialised rows and know their
//! columns by name, so predicates reference them as `$-.col` input
//! properties.

use super::plan::{ExecState, NodeId, NodeOutput, RelNode};
use super::{ExecResult, RowExprContext, RuntimeContext, StatAccumulator};
use crate::expr::{eval, Expression};
use crate::protocol::{OrderDirection, StatType};
use crate::value::Row;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Keeps rows whose predicate evaluates to exactly `true`.
pub struct FilterNode {
    pub dep: NodeId,
    pub columns: Vec<String>,
    pub predicate: Expression,
}

impl RelNode for FilterNode {
    fn name(&self) -> &'static str {
        "FilterNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let mut kept = Vec::new();
        for row in state.outputs[self.dep].rows() {
            ctx.check_killed()?;
            let expr_ctx = RowExprContext { columns: &self.columns, row };
            if eval(&self.predicate, &expr_ctx)?.is_true() {
                kept.push(row.clone());
            }
        }
        Ok(NodeOutput::Rows(kept))
    }
}

/// Stops after `n` rows.
pub struct LimitNode {
    pub dep: NodeId,
    pub n: usize,
}

impl RelNode for LimitNode {
    fn name(&self) -> &'static str {
        "LimitNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        let rows = state.outputs[self.dep].rows();
        Ok(NodeOutput::Rows(rows.iter().take(self.n).cloned().collect()))
    }
}

/// Bounded sort: an `n`-element max-heap whose top is the current worst
/// row; output is fully sorted on finalisation. Ties break
/// deterministically by the dependency's emission order, which for index
/// scans is key order.
pub struct TopNNode {
    pub dep: NodeId,
    pub n: usize,
    /// `(column, direction)` pairs, most significant first.
    pub keys: Vec<(usize, OrderDirection)>,
}

struct HeapEntry {
    row: Row,
    seq: usize,
    keys: std::sync::Arc<Vec<(usize, OrderDirection)>>,
}

impl HeapEntry {
    /// "Greater" means "worse": evicted first, emitted last.
    fn badness(&self, other: &HeapEntry) -> Ordering {
        for (col, direction) in self.keys.iter() {
            let key = self.row.values[*col].total_order(&other.row.values[*col]);
            let key = match direction {
                OrderDirection::Asc => key,
                OrderDirection::Desc => key.reverse(),
            };
            if key != Ordering::Equal {
                return key;
            }
        }
        self.seq.cmp(&other.seq)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.badness(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.badness(other)
    }
}

impl RelNode for TopNNode {
    fn name(&self) -> &'static str {
        "TopNNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        if self.n == 0 {
            return Ok(NodeOutput::Rows(Vec::new()));
        }
        let rows = state.outputs[self.dep].rows();
        let keys = std::sync::Arc::new(self.keys.clone());
        let capacity = self.n.saturating_add(1).min(rows.len() + 1);
        let mut heap = std::collections::BinaryHeap::with_capacity(capacity);
        for (seq, row) in rows.iter().enumerate() {
            heap.push(HeapEntry { row: row.clone(), seq, keys: std::sync::Arc::clone(&keys) });
            if heap.len() > self.n {
                heap.pop();
            }
        }
        Ok(NodeOutput::Rows(
            heap.into_sorted_vec().into_iter().map(|entry| entry.row).collect(),
        ))
    }
}

/// Standard GROUP BY with `SUM` / `AVG` / `MIN` / `MAX` / `COUNT` over a
/// child iterator. Output rows are `[group keys.., agg values..]`, in
/// first-seen group order.
pub struct AggregateNode {
    pub dep: NodeId,
    pub group_cols: Vec<usize>,
    pub aggs: Vec<(StatType, usize)>,
}

impl RelNode for AggregateNode {
    fn name(&self) -> &'static str {
        "AggregateNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let mut order: Vec<Vec<crate::value::Value>> = Vec::new();
        let mut groups: HashMap<Vec<crate::value::Value>, Vec<StatAccumulator>> = HashMap::new();
        for row in state.outputs[self.dep].rows() {
            ctx.check_killed()?;
            let key: Vec<crate::value::Value> = self
                .group_cols
                .iter()
                .map(|col| row.values[*col].clone())
                .collect();
            let accs = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                self.aggs.iter().map(|_| StatAccumulator::default()).collect()
            });
            for ((_, col), acc) in self.aggs.iter().zip(accs.iter_mut()) {
                acc.feed(&row.values[*col]);
            }
        }
        let rows = order
            .into_iter()
            .map(|key| {
                let accs = &groups[&key];
                let mut values = key;
                values.extend(
                    self.aggs
                        .iter()
                        .zip(accs)
                        .map(|((stat, _), acc)| acc.finish(*stat)),
                );
                Row::new(values)
            })
            .collect();
        Ok(NodeOutput::Rows(rows))
    }
}

/// Concatenates the rows of several dependencies in dependency order.
/// Lookups with multiple index query contexts fan in through this node.
pub struct UnionNode {
    pub deps: Vec<NodeId>,
}

impl RelNode for UnionNode {
    fn name(&self) -> &'static str {
        "UnionNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        let mut rows = Vec::new();
        for dep in &self.deps {
            rows.extend_from_slice(state.outputs[*dep].rows());
        }
        Ok(NodeOutput::Rows(rows))
    }
}

/// The distinguished leaf of scan and lookup plans: forwards its
/// dependency's rows (and cursor, for scans) so the dispatcher reads one
/// well-known slot per partition run.
pub struct OutputNode {
    pub dep: NodeId,
}

impl RelNode for OutputNode {
    fn name(&self) -> &'static str {
        "OutputNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        Ok(match &state.outputs[self.dep] {
            NodeOutput::Scan { rows, cursor } => {
                NodeOutput::Scan { rows: rows.clone(), cursor: cursor.clone() }
            }
            other => NodeOutput::Rows(other.rows().to_vec()),
        })
    }
}
