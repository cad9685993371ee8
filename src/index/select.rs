//! Optimizer-side index selection.
//!
//! Scores every candidate index against a conjunctive filter and picks
//! the best one, producing column hints plus the residual filter the
//! hints do not enforce. Scoring per bound column: equality beats range
//! beats not-equal; indexes compare by the lexicographic sequence of
//! their hint scores, longer sequences winning ties. A `!=` on the
//! leading usable column disqualifies the index outright - a full index
//! scan is almost never better than a full table scan.

use super::{IndexFieldDef, IndexItem};
use crate::expr::{Expression, RelOp};
use crate::protocol::{ColumnHint, ScanType};
use crate::value::{DataType, Value};
use crate::IndexId;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IndexScore {
    NotEqual = 0,
    Range = 1,
    Prefix = 2,
}

/// One `(value, inclusive)` bound of a merged range.
pub type Bound = (Value, bool);

/// Order two bounds so `a` holds the smaller one, the exclusive bound
/// first on equal values. Keeping `b` when merging lower bounds and `a`
/// when merging upper bounds therefore yields an inclusive merged lower
/// bound and an exclusive merged upper bound on ties.
pub fn compare_and_swap_bound(a: &mut Bound, b: &mut Bound) {
    match a.0.total_order(&b.0) {
        Ordering::Greater => std::mem::swap(a, b),
        Ordering::Less => {}
        Ordering::Equal => {
            if a.1 && !b.1 {
                std::mem::swap(a, b);
            }
        }
    }
}

/// Merge two lower (or two upper) bounds into the tighter one, the
/// commutative building block of range-hint merging.
pub fn merge_bounds(mut a: Bound, mut b: Bound, lower: bool) -> Bound {
    compare_and_swap_bound(&mut a, &mut b);
    if lower {
        b
    } else {
        a
    }
}

#[derive(Debug, Clone)]
struct ScoredHint {
    hint: Option<ColumnHint>,
    score: IndexScore,
    /// Conjunct indexes this hint consumed.
    used: Vec<usize>,
}

#[derive(Debug)]
struct IndexResult {
    index: Arc<IndexItem>,
    hints: Vec<ScoredHint>,
}

impl IndexResult {
    /// Lexicographic score-sequence comparison, longer wins ties:
    /// `{P,P,P} > {P,P,R} > {P,P} > {P,R} > {P} > {R} > {N}`.
    fn cmp_score(&self, other: &IndexResult) -> Ordering {
        let n = self.hints.len().min(other.hints.len());
        for i in 0..n {
            match self.hints[i].score.cmp(&other.hints[i].score) {
                Ordering::Equal => {}
                decided => return decided,
            }
        }
        self.hints.len().cmp(&other.hints.len())
    }
}

/// Output of index selection: the chosen index, the hints to push into
/// the iterator, and the residual filter to evaluate per decoded row.
#[derive(Debug, Clone)]
pub struct SelectedIndex {
    pub index_id: IndexId,
    pub column_hints: Vec<ColumnHint>,
    /// True iff every emitted hint is an equality prefix.
    pub is_prefix_scan: bool,
    pub residual: Option<Expression>,
}

/// A relational conjunct usable for index binding: `prop OP constant`
/// with the property on either side.
fn as_filter_item(expr: &Expression) -> Option<(&str, RelOp, &Value)> {
    let Expression::Relational { op, left, right } = expr else {
        return None;
    };
    match (&**left, &**right) {
        (
            Expression::TagProperty { prop, .. } | Expression::EdgeProperty { prop, .. },
            Expression::Constant(v),
        ) => Some((prop.as_str(), *op, v)),
        (
            Expression::Constant(v),
            Expression::TagProperty { prop, .. } | Expression::EdgeProperty { prop, .. },
        ) => Some((prop.as_str(), op.reversed()?, v)),
        _ => None,
    }
}

/// Score one conjunct against one index column. `None` when the conjunct
/// does not bind this column (wrong property, non-constant operand, or a
/// range on a bool column).
fn score_conjunct(field: &IndexFieldDef, expr: &Expression) -> Option<ScoredHint> {
    let (prop, op, value) = as_filter_item(expr)?;
    if prop != field.name {
        return None;
    }
    let hint = match op {
        RelOp::Eq => ScoredHint {
            hint: Some(ColumnHint::prefix(&field.name, value.clone())),
            score: IndexScore::Prefix,
            used: Vec::new(),
        },
        RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
            if field.dtype == DataType::Bool {
                return None;
            }
            let mut column = ColumnHint {
                column_name: field.name.clone(),
                scan_type: ScanType::Range,
                begin_value: None,
                include_begin: false,
                end_value: None,
                include_end: false,
            };
            match op {
                RelOp::Ge | RelOp::Gt => {
                    column.begin_value = Some(value.clone());
                    column.include_begin = op == RelOp::Ge;
                }
                RelOp::Le | RelOp::Lt => {
                    column.end_value = Some(value.clone());
                    column.include_end = op == RelOp::Le;
                }
                _ => {}
            }
            ScoredHint { hint: Some(column), score: IndexScore::Range, used: Vec::new() }
        }
        RelOp::Ne => ScoredHint { hint: None, score: IndexScore::NotEqual, used: Vec::new() },
        _ => return None,
    };
    Some(hint)
}

/// Merge all conjuncts binding one column into a single hint. `None`
/// means the merged interval is empty or poisoned by `!=`, making the
/// index unusable.
fn merge_column_hints(field: &IndexFieldDef, mut hints: Vec<ScoredHint>) -> Option<ScoredHint> {
    if hints.len() == 1 {
        return hints.pop();
    }
    let used: Vec<usize> = hints.iter().flat_map(|h| h.used.iter().copied()).collect();
    let mut begin: Option<Bound> = None;
    let mut end: Option<Bound> = None;
    for scored in &hints {
        match scored.score {
            IndexScore::NotEqual => return None,
            IndexScore::Prefix => {
                // equality participates as the closed point interval [v, v]
                let hint = scored.hint.as_ref()?;
                let v = hint.begin_value.clone()?;
                merge_into(&mut begin, (v.clone(), true), true);
                merge_into(&mut end, (v, true), false);
            }
            IndexScore::Range => {
                let hint = scored.hint.as_ref()?;
                if let Some(v) = &hint.begin_value {
                    merge_into(&mut begin, (v.clone(), hint.include_begin), true);
                }
                if let Some(v) = &hint.end_value {
                    merge_into(&mut end, (v.clone(), hint.include_end), false);
                }
            }
        }
    }
    // an interval with both bounds must be non-empty
    if let (Some(b), Some(e)) = (&begin, &end) {
        match b.0.total_order(&e.0) {
            Ordering::Greater => return None,
            Ordering::Equal if !(b.1 && e.1) => return None,
            _ => {}
        }
    }
    let (begin_value, include_begin) = match begin {
        Some((v, i)) => (Some(v), i),
        None => (None, false),
    };
    let (end_value, include_end) = match end {
        Some((v, i)) => (Some(v), i),
        None => (None, false),
    };
    Some(ScoredHint {
        hint: Some(ColumnHint {
            column_name: field.name.clone(),
            scan_type: ScanType::Range,
            begin_value,
            include_begin,
            end_value,
            include_end,
        }),
        score: IndexScore::Range,
        used,
    })
}

fn merge_into(slot: &mut Option<Bound>, bound: Bound, lower: bool) {
    *slot = Some(match slot.take() {
        None => bound,
        Some(existing) => merge_bounds(existing, bound, lower),
    });
}

/// Score one index against the filter's conjuncts, walking the index
/// column order and stopping at the first unbound column.
fn select_index(index: &Arc<IndexItem>, conjuncts: &[&Expression]) -> Option<IndexResult> {
    let mut hints = Vec::new();
    for field in &index.fields {
        let mut bound: Vec<ScoredHint> = Vec::new();
        for (pos, conjunct) in conjuncts.iter().enumerate() {
            if let Some(mut scored) = score_conjunct(field, conjunct) {
                scored.used.push(pos);
                bound.push(scored);
            }
        }
        if bound.is_empty() {
            break;
        }
        hints.push(merge_column_hints(field, bound)?);
    }
    if hints.is_empty() {
        return None;
    }
    Some(IndexResult { index: Arc::clone(index), hints })
}

/// Pick the best usable index for `filter`, or `None` when the caller
/// should fall back to a full scan. Accepts a single relational filter or
/// a conjunction; anything else never binds an index.
pub fn find_optimal_index(
    filter: &Expression,
    indexes: &[Arc<IndexItem>],
) -> Option<SelectedIndex> {
    if indexes.is_empty() {
        return None;
    }
    if !filter.is_relational() && !filter.is_logical_and() {
        return None;
    }
    let conjuncts = filter.conjuncts();

    let mut results: Vec<IndexResult> = indexes
        .iter()
        .filter_map(|index| select_index(index, &conjuncts))
        .collect();
    if results.is_empty() {
        return None;
    }
    results.sort_by(IndexResult::cmp_score);
    let best = results.pop()?;

    // A leading != never beats a full table scan.
    if best.hints[0].score == IndexScore::NotEqual {
        return None;
    }

    let mut column_hints = Vec::new();
    let mut used = vec![false; conjuncts.len()];
    let mut is_prefix_scan = true;
    for scored in &best.hints {
        match scored.score {
            IndexScore::Prefix => {
                column_hints.push(scored.hint.clone()?);
                for pos in &scored.used {
                    used[*pos] = true;
                }
            }
            IndexScore::Range => {
                column_hints.push(scored.hint.clone()?);
                for pos in &scored.used {
                    used[*pos] = true;
                }
                is_prefix_scan = false;
                // nothing binds past the first range column
                break;
            }
            IndexScore::NotEqual => break,
        }
    }

    let residual_conjuncts: Vec<Expression> = conjuncts
        .iter()
        .enumerate()
        .filter(|(pos, _)| !used[*pos])
        .map(|(_, e)| (*e).clone())
        .collect();
    let residual = match residual_conjuncts.len() {
        0 => None,
        1 => Some(residual_conjuncts.into_iter().next()?),
        _ => Some(Expression::and(residual_conjuncts)),
    };

    Some(SelectedIndex {
        index_id: best.index.index_id,
        column_hints,
        is_prefix_scan,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;
    use crate::protocol::SchemaRef;

    fn resolve_edge(text: &str) -> Expression {
        let parsed = parse_expression(text).expect("parse");
        parsed
            .resolve_labels(&|label, attr| {
                Some(Expression::EdgeProperty { edge: label.to_string(), prop: attr.to_string() })
            })
            .expect("resolve")
    }

    fn index(id: IndexId, cols: &[(&str, DataType)]) -> Arc<IndexItem> {
        Arc::new(IndexItem {
            index_id: id,
            name: format!("idx_{id}"),
            schema: SchemaRef::Edge(101),
            fields: cols.iter().map(|(n, t)| IndexFieldDef::new(n, *t)).collect(),
        })
    }

    #[test]
    fn equality_binds_prefix_hint() {
        let filter = resolve_edge("serve.teamName == \"Spurs\"");
        let indexes = vec![index(1, &[("teamName", DataType::String)])];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        assert_eq!(selected.index_id, 1);
        assert!(selected.is_prefix_scan);
        assert_eq!(selected.column_hints.len(), 1);
        assert_eq!(selected.column_hints[0].scan_type, ScanType::Prefix);
        assert!(selected.residual.is_none());
    }

    #[test]
    fn reversed_operands_bind() {
        let filter = resolve_edge("2000 <= serve.startYear");
        let indexes = vec![index(1, &[("startYear", DataType::Int)])];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        let hint = &selected.column_hints[0];
        assert_eq!(hint.scan_type, ScanType::Range);
        assert_eq!(hint.begin_value, Some(Value::Int(2000)));
        assert!(hint.include_begin);
    }

    #[test]
    fn range_conjuncts_merge_to_tightest_interval() {
        let filter =
            resolve_edge("serve.startYear >= 1995 AND serve.startYear > 2000 AND serve.startYear < 2010");
        let indexes = vec![index(1, &[("startYear", DataType::Int)])];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        let hint = &selected.column_hints[0];
        assert_eq!(hint.begin_value, Some(Value::Int(2000)));
        assert!(!hint.include_begin);
        assert_eq!(hint.end_value, Some(Value::Int(2010)));
        assert!(!hint.include_end);
        assert!(selected.residual.is_none());
    }

    #[test]
    fn empty_merged_interval_disqualifies() {
        let filter = resolve_edge("serve.startYear > 2010 AND serve.startYear < 2000");
        let indexes = vec![index(1, &[("startYear", DataType::Int)])];
        assert!(find_optimal_index(&filter, &indexes).is_none());
    }

    #[test]
    fn leading_not_equal_means_no_index() {
        let filter = resolve_edge("serve.teamName != \"Spurs\"");
        let indexes = vec![index(1, &[("teamName", DataType::String)])];
        assert!(find_optimal_index(&filter, &indexes).is_none());
    }

    #[test]
    fn longer_score_sequence_wins() {
        let filter = resolve_edge("serve.a == 1 AND serve.b == 2");
        let indexes = vec![
            index(1, &[("a", DataType::Int)]),
            index(2, &[("a", DataType::Int), ("b", DataType::Int)]),
        ];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        assert_eq!(selected.index_id, 2);
        assert_eq!(selected.column_hints.len(), 2);
        assert!(selected.is_prefix_scan);
    }

    #[test]
    fn prefix_beats_range_on_first_column() {
        let filter = resolve_edge("serve.a == 1 AND serve.b > 2");
        let indexes = vec![
            index(1, &[("b", DataType::Int)]),
            index(2, &[("a", DataType::Int)]),
        ];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        assert_eq!(selected.index_id, 2);
        // the b > 2 conjunct was not consumed
        let residual = selected.residual.expect("residual");
        assert_eq!(residual.to_string(), "(serve.b>2)");
    }

    #[test]
    fn hints_stop_at_first_range_column() {
        let filter = resolve_edge("serve.a == 1 AND serve.b > 2 AND serve.c == 3");
        let indexes = vec![index(
            1,
            &[("a", DataType::Int), ("b", DataType::Int), ("c", DataType::Int)],
        )];
        let selected = find_optimal_index(&filter, &indexes).expect("selected");
        assert_eq!(selected.column_hints.len(), 2);
        assert!(!selected.is_prefix_scan);
        // serve.c == 3 must survive in the residual
        let residual = selected.residual.expect("residual");
        assert_eq!(residual.to_string(), "(serve.c==3)");
    }

    #[test]
    fn unusable_filter_shapes_fall_back() {
        let filter = resolve_edge("serve.a == 1 OR serve.b == 2");
        let indexes = vec![index(1, &[("a", DataType::Int)])];
        assert!(find_optimal_index(&filter, &indexes).is_none());
    }

    #[test]
    fn bound_merge_is_commutative() {
        let a = (Value::Int(5), true);
        let b = (Value::Int(5), false);
        assert_eq!(merge_bounds(a.clone(), b.clone(), true), merge_bounds(b, a, true));
        let c = (Value::Int(3), false);
        let d = (Value::Int(9), true);
        assert_eq!(
            merge_bounds(c.clone(), d.clone(), false),
            merge_bounds(d, c, false)
        );
    }
}
