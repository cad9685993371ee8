//! Expression evaluation against a per-row context.
//!
//! Semantics pinned here:
//! - comparing incompatible types yields `Empty`, never an error;
//! - integer overflow is an error and fails the whole request;
//! - division by zero yields `Null`;
//! - `AND`/`OR` short-circuit left to right.

use super::{ArithOp, Expression, LogicalOp, RelOp, UnaryOp};
use crate::value::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("result of ({lhs}{op}{rhs}) cannot be represented as an integer")]
    IntegerOverflow { lhs: i64, op: char, rhs: i64 },
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Wrong number of arguments for {name}: expected {expected}, got {got}")]
    WrongArity { name: String, expected: usize, got: usize },
    #[error("Unresolved label in executable expression: {0}")]
    UnresolvedLabel(String),
}

/// Read-only view of the row being evaluated. Every accessor defaults to
/// `Empty` so contexts only implement what their node kind can provide.
pub trait ExprContext {
    fn src_vid(&self) -> Value {
        Value::Empty
    }
    fn variable(&self, _name: &str) -> Value {
        Value::Empty
    }
    fn input_property(&self, _name: &str) -> Value {
        Value::Empty
    }
    fn tag_property(&self, _tag: &str, _prop: &str) -> Value {
        Value::Empty
    }
    fn edge_property(&self, _edge: &str, _prop: &str) -> Value {
        Value::Empty
    }
    /// Source-vertex tag property; for the expansion kernel this is the
    /// same lookup as `tag_property`.
    fn src_property(&self, tag: &str, prop: &str) -> Value {
        self.tag_property(tag, prop)
    }
    fn dst_property(&self, _tag: &str, _prop: &str) -> Value {
        Value::Empty
    }
    fn edge_src(&self, _edge: &str) -> Value {
        Value::Empty
    }
    fn edge_dst(&self, _edge: &str) -> Value {
        Value::Empty
    }
    fn edge_rank(&self, _edge: &str) -> Value {
        Value::Empty
    }
    fn edge_type_value(&self, _edge: &str) -> Value {
        Value::Empty
    }
}

/// Context with no bindings at all; used for folding closed expressions.
pub struct EmptyContext;

impl ExprContext for EmptyContext {}

pub fn eval(expr: &Expression, ctx: &dyn ExprContext) -> Result<Value, ExprError> {
    match expr {
        Expression::Constant(v) => Ok(v.clone()),
        Expression::Variable(name) => Ok(ctx.variable(name)),
        Expression::InputProperty(name) => Ok(ctx.input_property(name)),
        Expression::TagProperty { tag, prop } => Ok(ctx.tag_property(tag, prop)),
        Expression::EdgeProperty { edge, prop } => Ok(ctx.edge_property(edge, prop)),
        Expression::SrcProperty { tag, prop } => Ok(ctx.src_property(tag, prop)),
        Expression::DstProperty { tag, prop } => Ok(ctx.dst_property(tag, prop)),
        Expression::EdgeSrc { edge } => Ok(ctx.edge_src(edge)),
        Expression::EdgeDst { edge } => Ok(ctx.edge_dst(edge)),
        Expression::EdgeTypeOf { edge } => Ok(ctx.edge_type_value(edge)),
        Expression::EdgeRank { edge } => Ok(ctx.edge_rank(edge)),
        Expression::LabelAttribute { label, attr } => {
            Err(ExprError::UnresolvedLabel(format!("{label}.{attr}")))
        }
        Expression::Unary { op, operand } => {
            let v = eval(operand, ctx)?;
            eval_unary(*op, v)
        }
        Expression::Arithmetic { op, left, right } => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            eval_arithmetic(*op, &l, &r)
        }
        Expression::Relational { op, left, right } => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            Ok(eval_relational(*op, &l, &r))
        }
        Expression::Logical { op, operands } => eval_logical(*op, operands, ctx),
        Expression::Subscript { collection, index } => {
            let c = eval(collection, ctx)?;
            let i = eval(index, ctx)?;
            Ok(eval_subscript(&c, &i))
        }
        Expression::FunctionCall { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, ctx)?);
            }
            eval_function(name, &values)
        }
        Expression::ListLiteral(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, ctx)?);
            }
            Ok(Value::List(values))
        }
        Expression::SetLiteral(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, ctx)?);
            }
            Ok(normalize_set(values))
        }
        Expression::MapLiteral(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), eval(v, ctx)?);
            }
            Ok(Value::Map(map))
        }
    }
}

/// Sort by total order and deduplicate; set literals are normalized so the
/// folded constant is canonical.
pub(super) fn normalize_set(mut values: Vec<Value>) -> Value {
    values.sort_by(Value::total_order);
    values.dedup();
    Value::Set(values)
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Not => Ok(match v {
            Value::Bool(b) => Value::Bool(!b),
            Value::Null => Value::Null,
            _ => Value::Empty,
        }),
        UnaryOp::Negate => match v {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(ExprError::IntegerOverflow { lhs: 0, op: '-', rhs: i }),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Null => Ok(Value::Null),
            _ => Ok(Value::Empty),
        },
    }
}

fn eval_arithmetic(op: ArithOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    // String concatenation rides on Add.
    if op == ArithOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (l, r) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => eval_int_arithmetic(op, *a, *b),
        _ => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Ok(Value::Empty);
            };
            Ok(match op {
                ArithOp::Add => Value::Float(a + b),
                ArithOp::Sub => Value::Float(a - b),
                ArithOp::Mul => Value::Float(a * b),
                ArithOp::Div => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Float(a / b)
                    }
                }
                ArithOp::Mod => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Float(a % b)
                    }
                }
            })
        }
    }
}

fn eval_int_arithmetic(op: ArithOp, a: i64, b: i64) -> Result<Value, ExprError> {
    let overflow = || ExprError::IntegerOverflow { lhs: a, op: op.symbol(), rhs: b };
    match op {
        ArithOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Div => {
            if b == 0 {
                Ok(Value::Null)
            } else {
                a.checked_div(b).map(Value::Int).ok_or_else(overflow)
            }
        }
        ArithOp::Mod => {
            if b == 0 {
                Ok(Value::Null)
            } else {
                a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
            }
        }
    }
}

fn eval_relational(op: RelOp, l: &Value, r: &Value) -> Value {
    match op {
        RelOp::Eq | RelOp::Ne | RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
            let Some(ord) = l.compare(r) else {
                return Value::Empty;
            };
            let holds = match op {
                RelOp::Eq => ord == Ordering::Equal,
                RelOp::Ne => ord != Ordering::Equal,
                RelOp::Lt => ord == Ordering::Less,
                RelOp::Le => ord != Ordering::Greater,
                RelOp::Gt => ord == Ordering::Greater,
                RelOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            };
            Value::Bool(holds)
        }
        RelOp::In => match r {
            Value::List(items) | Value::Set(items) => {
                Value::Bool(items.iter().any(|item| item == l))
            }
            Value::Map(map) => match l {
                Value::Str(k) => Value::Bool(map.contains_key(k)),
                _ => Value::Empty,
            },
            _ => Value::Empty,
        },
        RelOp::Contains => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Value::Bool(a.contains(b.as_str())),
            _ => Value::Empty,
        },
        RelOp::StartsWith => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Value::Bool(a.starts_with(b.as_str())),
            _ => Value::Empty,
        },
        RelOp::EndsWith => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Value::Bool(a.ends_with(b.as_str())),
            _ => Value::Empty,
        },
    }
}

fn eval_logical(
    op: LogicalOp,
    operands: &[Expression],
    ctx: &dyn ExprContext,
) -> Result<Value, ExprError> {
    let mut saw_non_bool = false;
    for operand in operands {
        match (op, eval(operand, ctx)?) {
            (LogicalOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
            (LogicalOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
            (_, Value::Bool(_)) => {}
            _ => saw_non_bool = true,
        }
    }
    if saw_non_bool {
        Ok(Value::Empty)
    } else {
        Ok(Value::Bool(op == LogicalOp::And))
    }
}

fn eval_subscript(collection: &Value, index: &Value) -> Value {
    match (collection, index) {
        (Value::List(items) | Value::Set(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { *i + len } else { *i };
            if idx < 0 || idx >= len {
                Value::Null
            } else {
                items[idx as usize].clone()
            }
        }
        (Value::Map(map), Value::Str(k)) => map.get(k).cloned().unwrap_or(Value::Null),
        _ => Value::Empty,
    }
}

fn eval_function(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let expect = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(ExprError::WrongArity { name: name.to_string(), expected: n, got: args.len() })
        }
    };
    match name {
        "abs" => {
            expect(1)?;
            match &args[0] {
                Value::Int(v) => v
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or(ExprError::IntegerOverflow { lhs: 0, op: '-', rhs: *v }),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                Value::Null => Ok(Value::Null),
                _ => Ok(Value::Empty),
            }
        }
        "size" => {
            expect(1)?;
            Ok(match &args[0] {
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                Value::List(v) | Value::Set(v) => Value::Int(v.len() as i64),
                Value::Map(m) => Value::Int(m.len() as i64),
                Value::Null => Value::Null,
                _ => Value::Empty,
            })
        }
        "lower" => {
            expect(1)?;
            Ok(match &args[0] {
                Value::Str(s) => Value::Str(s.to_lowercase()),
                _ => Value::Empty,
            })
        }
        "upper" => {
            expect(1)?;
            Ok(match &args[0] {
                Value::Str(s) => Value::Str(s.to_uppercase()),
                _ => Value::Empty,
            })
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn eval_text(text: &str) -> Result<Value, ExprError> {
        let expr = parse_expression(text).expect("parse");
        eval(&expr, &EmptyContext)
    }

    #[test]
    fn arithmetic_basics() {
        assert_eq!(eval_text("1 + 2 * 3"), Ok(Value::Int(7)));
        assert_eq!(eval_text("7 % 3"), Ok(Value::Int(1)));
        assert_eq!(eval_text("1.5 + 1"), Ok(Value::Float(2.5)));
    }

    #[test]
    fn division_by_zero_is_null() {
        assert_eq!(eval_text("1 / 0"), Ok(Value::Null));
        assert_eq!(eval_text("1 % 0"), Ok(Value::Null));
    }

    #[test]
    fn integer_overflow_message() {
        let err = eval_text("-9223372036854775808 - 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "result of (-9223372036854775808-1) cannot be represented as an integer"
        );
    }

    #[test]
    fn incompatible_comparison_yields_empty() {
        assert_eq!(eval_text("1 < \"a\""), Ok(Value::Empty));
        assert_eq!(eval_text("true == 1"), Ok(Value::Empty));
    }

    #[test]
    fn logical_short_circuit() {
        // The incompatible comparison on the right is never reached.
        assert_eq!(eval_text("false AND (1 < \"a\")"), Ok(Value::Bool(false)));
        assert_eq!(eval_text("true OR (1 < \"a\")"), Ok(Value::Bool(true)));
        // Reached, so the whole conjunction is Empty.
        assert_eq!(eval_text("true AND (1 < \"a\")"), Ok(Value::Empty));
    }

    #[test]
    fn in_and_subscript() {
        assert_eq!(eval_text("2 IN [1, 2, 3]"), Ok(Value::Bool(true)));
        assert_eq!(eval_text("[10, 20, 30][1]"), Ok(Value::Int(20)));
        assert_eq!(eval_text("[10, 20, 30][-1]"), Ok(Value::Int(30)));
        assert_eq!(eval_text("[10][5]"), Ok(Value::Null));
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval_text("size(\"abc\")"), Ok(Value::Int(3)));
        assert_eq!(eval_text("upper(\"abc\")"), Ok(Value::Str("ABC".into())));
        assert_eq!(
            eval_text("\"teamName\" STARTS WITH \"team\""),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn unknown_function_is_error() {
        assert!(matches!(
            eval_text("nope(1)"),
            Err(ExprError::UnknownFunction(_))
        ));
    }
}
