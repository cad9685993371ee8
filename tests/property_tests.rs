//! Property-based checks: expression codec round-trips, bound-merge
//! commutativity, and index-selector soundness over generated
//! conjunctive filters.

use proptest::prelude::*;
use quiver_storage::expr::{
    decode_expression, encode_expression, eval, Expression, ExprContext, RelOp,
};
use quiver_storage::index::{find_optimal_index, merge_bounds, IndexFieldDef, IndexItem};
use quiver_storage::protocol::{ColumnHint, ScanType, SchemaRef};
use quiver_storage::value::{DataType, Value};
use std::sync::Arc;

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Empty),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Str),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Expression> {
    prop_oneof![
        arb_scalar().prop_map(Expression::Constant),
        "[a-z]{1,8}".prop_map(Expression::Variable),
        "[a-z]{1,8}".prop_map(Expression::InputProperty),
        ("[a-z]{1,8}", "[a-z]{1,8}").prop_map(|(tag, prop)| Expression::TagProperty { tag, prop }),
        ("[a-z]{1,8}", "[a-z]{1,8}")
            .prop_map(|(edge, prop)| Expression::EdgeProperty { edge, prop }),
        "[a-z]{1,8}".prop_map(|edge| Expression::EdgeRank { edge }),
        ("[a-z]{1,8}", "[a-z]{1,8}")
            .prop_map(|(label, attr)| Expression::LabelAttribute { label, attr }),
    ]
}

fn arb_expression() -> impl Strategy<Value = Expression> {
    arb_leaf().prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expression::Arithmetic {
                op: quiver_storage::expr::ArithOp::Add,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expression::relational(
                RelOp::Lt,
                l,
                r
            )),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Expression::and),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Expression::or),
            inner.clone().prop_map(Expression::not),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Expression::ListLiteral),
            (inner.clone(), inner).prop_map(|(c, i)| Expression::Subscript {
                collection: Box::new(c),
                index: Box::new(i),
            }),
        ]
    })
}

proptest! {
    #[test]
    fn expression_codec_round_trips(expr in arb_expression()) {
        let bytes = encode_expression(&expr);
        let decoded = decode_expression(&bytes).expect("decode");
        prop_assert_eq!(decoded, expr);
    }

    #[test]
    fn bound_merge_commutes(
        a in any::<i64>(),
        ai in any::<bool>(),
        b in any::<i64>(),
        bi in any::<bool>(),
        lower in any::<bool>(),
    ) {
        let x = (Value::Int(a), ai);
        let y = (Value::Int(b), bi);
        prop_assert_eq!(
            merge_bounds(x.clone(), y.clone(), lower),
            merge_bounds(y, x, lower)
        );
    }
}

// -- selector soundness -----------------------------------------------------

#[derive(Debug, Clone)]
struct Conjunct {
    col: usize,
    op: RelOp,
    value: i64,
}

fn arb_conjuncts() -> impl Strategy<Value = Vec<Conjunct>> {
    prop::collection::vec(
        (0usize..3, 0usize..6, -50i64..50).prop_map(|(col, op, value)| Conjunct {
            col,
            op: [RelOp::Eq, RelOp::Ne, RelOp::Lt, RelOp::Le, RelOp::Gt, RelOp::Ge][op],
            value,
        }),
        1..5,
    )
}

const COLS: [&str; 3] = ["a", "b", "c"];

fn conjuncts_to_filter(conjuncts: &[Conjunct]) -> Expression {
    let leaves: Vec<Expression> = conjuncts
        .iter()
        .map(|c| {
            Expression::relational(
                c.op,
                Expression::tag_prop("t", COLS[c.col]),
                Expression::constant(Value::Int(c.value)),
            )
        })
        .collect();
    if leaves.len() == 1 {
        leaves.into_iter().next().expect("one leaf")
    } else {
        Expression::and(leaves)
    }
}

struct RowCtx {
    values: [i64; 3],
}

impl ExprContext for RowCtx {
    fn tag_property(&self, _tag: &str, prop: &str) -> Value {
        match COLS.iter().position(|c| *c == prop) {
            Some(idx) => Value::Int(self.values[idx]),
            None => Value::Empty,
        }
    }
}

/// Does a row satisfy every emitted column hint?
fn hints_admit(hints: &[ColumnHint], row: &RowCtx) -> bool {
    hints.iter().all(|hint| {
        let idx = COLS.iter().position(|c| *c == hint.column_name).expect("known col");
        let v = row.values[idx];
        match hint.scan_type {
            ScanType::Prefix => hint.begin_value == Some(Value::Int(v)),
            ScanType::Range => {
                let lower_ok = match (&hint.begin_value, hint.include_begin) {
                    (Some(Value::Int(b)), true) => v >= *b,
                    (Some(Value::Int(b)), false) => v > *b,
                    _ => true,
                };
                let upper_ok = match (&hint.end_value, hint.include_end) {
                    (Some(Value::Int(e)), true) => v <= *e,
                    (Some(Value::Int(e)), false) => v < *e,
                    _ => true,
                };
                lower_ok && upper_ok
            }
        }
    })
}

proptest! {
    /// For any conjunctive filter and any row: filter(row) implies both
    /// the hinted key range and the residual admit the row, and a row in
    /// the hinted range satisfying the residual satisfies the filter.
    #[test]
    fn selector_is_sound(
        conjuncts in arb_conjuncts(),
        a in -60i64..60,
        b in -60i64..60,
        c in -60i64..60,
    ) {
        let index = Arc::new(IndexItem {
            index_id: 1,
            name: "t_abc".into(),
            schema: SchemaRef::Tag(1),
            fields: COLS.iter().map(|c| IndexFieldDef::new(c, DataType::Int)).collect(),
        });
        let filter = conjuncts_to_filter(&conjuncts);
        let Some(selected) = find_optimal_index(&filter, &[index]) else {
            // no usable index: the caller would full-scan, nothing to check
            return Ok(());
        };

        let row = RowCtx { values: [a, b, c] };
        let filter_holds = eval(&filter, &row).expect("filter eval").is_true();
        let hints_hold = hints_admit(&selected.column_hints, &row);
        let residual_holds = match &selected.residual {
            Some(residual) => eval(residual, &row).expect("residual eval").is_true(),
            None => true,
        };

        if filter_holds {
            prop_assert!(hints_hold, "filter admits a row outside the hinted range");
            prop_assert!(residual_holds, "filter admits a row the residual rejects");
        }
        if hints_hold && residual_holds {
            prop_assert!(filter_holds, "hints+residual admit a row the filter rejects");
        }
    }
}
