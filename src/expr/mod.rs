//! # Expression Engine
//!
//! A value-producing tree over per-row evaluation contexts. Filters and
//! stat expressions arrive over RPC as encoded byte strings ([`codec`]),
//! are folded once per request ([`fold`]), and are then evaluated per row
//! against an [`ExprContext`] ([`eval`]). The text front end ([`parse`])
//! exists for the query layer and for tests.
//!
//! Evaluation is pure: the same context always yields the same value.
//! Comparing incompatible types yields [`Value::Empty`]; integer overflow
//! is an error that fails the whole request.

mod codec;
mod eval;
mod fold;
mod parse;

pub use codec::{decode_expression, encode_expression, CodecError};
pub use eval::{eval, EmptyContext, ExprContext, ExprError};
pub use fold::{fold, fold_constant};
pub use parse::{parse_expression, ParseError};

use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Sub => '-',
            ArithOp::Mul => '*',
            ArithOp::Div => '/',
            ArithOp::Mod => '%',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
    StartsWith,
    EndsWith,
}

impl RelOp {
    /// The operator with its operands swapped: `c OP prop` becomes
    /// `prop (reversed OP) c`. Only defined for the ordered comparisons.
    pub fn reversed(self) -> Option<RelOp> {
        match self {
            RelOp::Eq => Some(RelOp::Eq),
            RelOp::Ne => Some(RelOp::Ne),
            RelOp::Lt => Some(RelOp::Gt),
            RelOp::Le => Some(RelOp::Ge),
            RelOp::Gt => Some(RelOp::Lt),
            RelOp::Ge => Some(RelOp::Le),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
            RelOp::In => " IN ",
            RelOp::Contains => " CONTAINS ",
            RelOp::StartsWith => " STARTS WITH ",
            RelOp::EndsWith => " ENDS WITH ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// The expression tree. Leaves resolve against the evaluation context;
/// `LabelAttribute` is the parser-level "name.name" form that the request
/// builder resolves to a tag or edge property before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(Value),
    Variable(String),
    /// A column of the inbound row (index lookups, residual filters).
    InputProperty(String),
    TagProperty { tag: String, prop: String },
    EdgeProperty { edge: String, prop: String },
    /// Tag property of the current edge's source vertex (`$^.tag.prop`).
    SrcProperty { tag: String, prop: String },
    /// Tag property of the current edge's destination vertex (`$$.tag.prop`).
    DstProperty { tag: String, prop: String },
    EdgeSrc { edge: String },
    EdgeDst { edge: String },
    EdgeTypeOf { edge: String },
    EdgeRank { edge: String },
    /// Unresolved `label.attr`; resolution happens against the request's
    /// tag and edge contexts.
    LabelAttribute { label: String, attr: String },
    Unary { op: UnaryOp, operand: Box<Expression> },
    Arithmetic { op: ArithOp, left: Box<Expression>, right: Box<Expression> },
    Relational { op: RelOp, left: Box<Expression>, right: Box<Expression> },
    /// N-ary and short-circuiting, like the logical connectives of the
    /// query language.
    Logical { op: LogicalOp, operands: Vec<Expression> },
    Subscript { collection: Box<Expression>, index: Box<Expression> },
    FunctionCall { name: String, args: Vec<Expression> },
    ListLiteral(Vec<Expression>),
    SetLiteral(Vec<Expression>),
    MapLiteral(Vec<(String, Expression)>),
}

impl Expression {
    pub fn constant(value: Value) -> Self {
        Expression::Constant(value)
    }

    pub fn tag_prop(tag: &str, prop: &str) -> Self {
        Expression::TagProperty { tag: tag.to_string(), prop: prop.to_string() }
    }

    pub fn edge_prop(edge: &str, prop: &str) -> Self {
        Expression::EdgeProperty { edge: edge.to_string(), prop: prop.to_string() }
    }

    pub fn relational(op: RelOp, left: Expression, right: Expression) -> Self {
        Expression::Relational { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::Logical { op: LogicalOp::And, operands }
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Logical { op: LogicalOp::Or, operands }
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Unary { op: UnaryOp::Not, operand: Box::new(operand) }
    }

    pub fn add(self, rhs: Expression) -> Self {
        Expression::Arithmetic { op: ArithOp::Add, left: Box::new(self), right: Box::new(rhs) }
    }

    pub fn sub(self, rhs: Expression) -> Self {
        Expression::Arithmetic { op: ArithOp::Sub, left: Box::new(self), right: Box::new(rhs) }
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, Expression::Relational { .. })
    }

    pub fn is_logical_and(&self) -> bool {
        matches!(self, Expression::Logical { op: LogicalOp::And, .. })
    }

    /// The conjuncts of a top-level AND, or the expression itself.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        match self {
            Expression::Logical { op: LogicalOp::And, operands } => operands.iter().collect(),
            other => vec![other],
        }
    }

    /// Walk the tree, calling `visit` on every node.
    pub fn visit<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::Unary { operand, .. } => operand.visit(visit),
            Expression::Arithmetic { left, right, .. }
            | Expression::Relational { left, right, .. } => {
                left.visit(visit);
                right.visit(visit);
            }
            Expression::Logical { operands, .. } => {
                for op in operands {
                    op.visit(visit);
                }
            }
            Expression::Subscript { collection, index } => {
                collection.visit(visit);
                index.visit(visit);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.visit(visit);
                }
            }
            Expression::ListLiteral(items) | Expression::SetLiteral(items) => {
                for item in items {
                    item.visit(visit);
                }
            }
            Expression::MapLiteral(entries) => {
                for (_, v) in entries {
                    v.visit(visit);
                }
            }
            _ => {}
        }
    }

    /// Whether the tree contains any context-dependent leaf. Closed
    /// expressions fold to a single constant once per request.
    pub fn is_closed(&self) -> bool {
        let mut closed = true;
        self.visit(&mut |node| {
            if matches!(
                node,
                Expression::Variable(_)
                    | Expression::InputProperty(_)
                    | Expression::TagProperty { .. }
                    | Expression::EdgeProperty { .. }
                    | Expression::SrcProperty { .. }
                    | Expression::DstProperty { .. }
                    | Expression::EdgeSrc { .. }
                    | Expression::EdgeDst { .. }
                    | Expression::EdgeTypeOf { .. }
                    | Expression::EdgeRank { .. }
                    | Expression::LabelAttribute { .. }
            ) {
                closed = false;
            }
        });
        closed
    }

    /// Rewrite every `LabelAttribute` with `resolve`, leaving other nodes
    /// intact. Returns `None` when `resolve` rejects a label.
    pub fn resolve_labels(
        &self,
        resolve: &dyn Fn(&str, &str) -> Option<Expression>,
    ) -> Option<Expression> {
        let rewrite = |e: &Expression| e.resolve_labels(resolve);
        Some(match self {
            Expression::LabelAttribute { label, attr } => resolve(label, attr)?,
            Expression::Unary { op, operand } => Expression::Unary {
                op: *op,
                operand: Box::new(rewrite(operand)?),
            },
            Expression::Arithmetic { op, left, right } => Expression::Arithmetic {
                op: *op,
                left: Box::new(rewrite(left)?),
                right: Box::new(rewrite(right)?),
            },
            Expression::Relational { op, left, right } => Expression::Relational {
                op: *op,
                left: Box::new(rewrite(left)?),
                right: Box::new(rewrite(right)?),
            },
            Expression::Logical { op, operands } => Expression::Logical {
                op: *op,
                operands: operands.iter().map(rewrite).collect::<Option<Vec<_>>>()?,
            },
            Expression::Subscript { collection, index } => Expression::Subscript {
                collection: Box::new(rewrite(collection)?),
                index: Box::new(rewrite(index)?),
            },
            Expression::FunctionCall { name, args } => Expression::FunctionCall {
                name: name.clone(),
                args: args.iter().map(rewrite).collect::<Option<Vec<_>>>()?,
            },
            Expression::ListLiteral(items) => {
                Expression::ListLiteral(items.iter().map(rewrite).collect::<Option<Vec<_>>>()?)
            }
            Expression::SetLiteral(items) => {
                Expression::SetLiteral(items.iter().map(rewrite).collect::<Option<Vec<_>>>()?)
            }
            Expression::MapLiteral(entries) => Expression::MapLiteral(
                entries
                    .iter()
                    .map(|(k, v)| Some((k.clone(), rewrite(v)?)))
                    .collect::<Option<Vec<_>>>()?,
            ),
            other => other.clone(),
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(v) => write!(f, "{v}"),
            Expression::Variable(name) => write!(f, "${name}"),
            Expression::InputProperty(name) => write!(f, "$-.{name}"),
            Expression::TagProperty { tag, prop } => write!(f, "{tag}.{prop}"),
            Expression::EdgeProperty { edge, prop } => write!(f, "{edge}.{prop}"),
            Expression::SrcProperty { tag, prop } => write!(f, "$^.{tag}.{prop}"),
            Expression::DstProperty { tag, prop } => write!(f, "$$.{tag}.{prop}"),
            Expression::EdgeSrc { edge } => write!(f, "{edge}._src"),
            Expression::EdgeDst { edge } => write!(f, "{edge}._dst"),
            Expression::EdgeTypeOf { edge } => write!(f, "{edge}._type"),
            Expression::EdgeRank { edge } => write!(f, "{edge}._rank"),
            Expression::LabelAttribute { label, attr } => write!(f, "{label}.{attr}"),
            Expression::Unary { op: UnaryOp::Not, operand } => write!(f, "!({operand})"),
            Expression::Unary { op: UnaryOp::Negate, operand } => write!(f, "-({operand})"),
            Expression::Arithmetic { op, left, right } => {
                write!(f, "({left}{}{right})", op.symbol())
            }
            Expression::Relational { op, left, right } => {
                write!(f, "({left}{}{right})", op.symbol())
            }
            Expression::Logical { op, operands } => {
                let sep = match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{sep}")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
            Expression::Subscript { collection, index } => write!(f, "{collection}[{index}]"),
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expression::ListLiteral(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expression::SetLiteral(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
            Expression::MapLiteral(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
