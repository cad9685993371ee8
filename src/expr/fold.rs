//! Constant folding.
//!
//! Runs once per request, right after a filter is decoded. Closed subtrees
//! (no context-dependent leaves) collapse to a single `Constant`, so list,
//! set and map literals inside a filter are built exactly once and shared
//! by every row evaluation. Folding evaluates with the checked operators,
//! so an overflowing constant expression fails the request here, before
//! any partition runs.

use super::eval::{eval, EmptyContext, ExprError};
use super::Expression;
use crate::value::Value;

/// Fold every closed subtree of `expr` to a constant. Errors surface the
/// same way runtime evaluation errors do (request-fatal at the caller).
pub fn fold(expr: &Expression) -> Result<Expression, ExprError> {
    if expr.is_closed() {
        return Ok(Expression::Constant(eval(expr, &EmptyContext)?));
    }
    Ok(match expr {
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(fold(operand)?),
        },
        Expression::Arithmetic { op, left, right } => Expression::Arithmetic {
            op: *op,
            left: Box::new(fold(left)?),
            right: Box::new(fold(right)?),
        },
        Expression::Relational { op, left, right } => Expression::Relational {
            op: *op,
            left: Box::new(fold(left)?),
            right: Box::new(fold(right)?),
        },
        Expression::Logical { op, operands } => Expression::Logical {
            op: *op,
            operands: operands.iter().map(fold).collect::<Result<Vec<_>, _>>()?,
        },
        Expression::Subscript { collection, index } => Expression::Subscript {
            collection: Box::new(fold(collection)?),
            index: Box::new(fold(index)?),
        },
        Expression::FunctionCall { name, args } => Expression::FunctionCall {
            name: name.clone(),
            args: args.iter().map(fold).collect::<Result<Vec<_>, _>>()?,
        },
        Expression::ListLiteral(items) => {
            Expression::ListLiteral(items.iter().map(fold).collect::<Result<Vec<_>, _>>()?)
        }
        Expression::SetLiteral(items) => {
            Expression::SetLiteral(items.iter().map(fold).collect::<Result<Vec<_>, _>>()?)
        }
        Expression::MapLiteral(entries) => Expression::MapLiteral(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), fold(v)?)))
                .collect::<Result<Vec<_>, ExprError>>()?,
        ),
        leaf => leaf.clone(),
    })
}

/// Fold a closed expression all the way to its value. `None` when the
/// expression depends on a context or fails to evaluate; used for schema
/// default values, which must be closed.
pub fn fold_constant(expr: &Expression) -> Option<Value> {
    if !expr.is_closed() {
        return None;
    }
    eval(expr, &EmptyContext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    #[test]
    fn closed_subtree_folds_inside_open_filter() {
        let expr = parse_expression("serve.startYear IN [2000 + 1, 2002]").expect("parse");
        let folded = fold(&expr).expect("fold");
        match folded {
            Expression::Relational { right, .. } => {
                assert_eq!(
                    *right,
                    Expression::Constant(Value::List(vec![Value::Int(2001), Value::Int(2002)]))
                );
            }
            other => panic!("expected relational, got {other:?}"),
        }
    }

    #[test]
    fn overflow_surfaces_during_fold() {
        let expr = parse_expression("serve.rank > 9223372036854775807 + 1").expect("parse");
        let err = fold(&expr).unwrap_err();
        assert!(err.to_string().contains("cannot be represented as an integer"));
    }

    #[test]
    fn open_leaves_survive() {
        let expr = parse_expression("serve.teamAvgScore > 20").expect("parse");
        let folded = fold(&expr).expect("fold");
        assert_eq!(folded, expr);
    }
}
