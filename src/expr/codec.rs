//! Pinned byte encoding for expressions.
//!
//! Filters cross the RPC boundary in this format, so the layout is part of
//! the protocol contract and must stay stable across versions:
//!
//! - one tag byte per node kind, children in declared order;
//! - all integers little-endian; strings are `u32 LE length + UTF-8 bytes`;
//! - constants carry their own value tag byte.
//!
//! `decode(encode(e))` reproduces `e` exactly; trailing bytes are an error.

use super::{ArithOp, Expression, LogicalOp, RelOp, UnaryOp};
use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unexpected end of encoded expression")]
    UnexpectedEof,
    #[error("Unknown expression tag: {0:#04x}")]
    UnknownExprTag(u8),
    #[error("Unknown value tag: {0:#04x}")]
    UnknownValueTag(u8),
    #[error("Unknown operator byte: {0:#04x}")]
    UnknownOp(u8),
    #[error("Encoded string is not valid UTF-8")]
    InvalidUtf8,
    #[error("Trailing bytes after expression")]
    TrailingBytes,
}

// Expression tags.
const T_CONSTANT: u8 = 0x01;
const T_VARIABLE: u8 = 0x02;
const T_INPUT_PROP: u8 = 0x03;
const T_TAG_PROP: u8 = 0x04;
const T_EDGE_PROP: u8 = 0x05;
const T_SRC_PROP: u8 = 0x06;
const T_DST_PROP: u8 = 0x07;
const T_EDGE_SRC: u8 = 0x08;
const T_EDGE_DST: u8 = 0x09;
const T_EDGE_TYPE: u8 = 0x0a;
const T_EDGE_RANK: u8 = 0x0b;
const T_LABEL_ATTR: u8 = 0x0c;
const T_UNARY: u8 = 0x10;
const T_ARITHMETIC: u8 = 0x11;
const T_RELATIONAL: u8 = 0x12;
const T_LOGICAL: u8 = 0x13;
const T_SUBSCRIPT: u8 = 0x14;
const T_FUNCTION: u8 = 0x15;
const T_LIST: u8 = 0x16;
const T_SET: u8 = 0x17;
const T_MAP: u8 = 0x18;

// Value tags.
const V_EMPTY: u8 = 0x00;
const V_NULL: u8 = 0x01;
const V_BOOL: u8 = 0x02;
const V_INT: u8 = 0x03;
const V_FLOAT: u8 = 0x04;
const V_STR: u8 = 0x05;
const V_TIMESTAMP: u8 = 0x06;
const V_LIST: u8 = 0x07;
const V_SET: u8 = 0x08;
const V_MAP: u8 = 0x09;

/// Serialise an expression into the wire format.
pub fn encode_expression(expr: &Expression) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(expr, &mut buf);
    buf
}

/// Decode a full byte string; trailing bytes fail.
pub fn decode_expression(bytes: &[u8]) -> Result<Expression, CodecError> {
    let mut reader = Reader { bytes, pos: 0 };
    let expr = decode_node(&mut reader)?;
    if reader.pos != bytes.len() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(expr)
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn encode_into(expr: &Expression, buf: &mut Vec<u8>) {
    match expr {
        Expression::Constant(v) => {
            buf.push(T_CONSTANT);
            encode_value(v, buf);
        }
        Expression::Variable(name) => {
            buf.push(T_VARIABLE);
            put_str(buf, name);
        }
        Expression::InputProperty(name) => {
            buf.push(T_INPUT_PROP);
            put_str(buf, name);
        }
        Expression::TagProperty { tag, prop } => {
            buf.push(T_TAG_PROP);
            put_str(buf, tag);
            put_str(buf, prop);
        }
        Expression::EdgeProperty { edge, prop } => {
            buf.push(T_EDGE_PROP);
            put_str(buf, edge);
            put_str(buf, prop);
        }
        Expression::SrcProperty { tag, prop } => {
            buf.push(T_SRC_PROP);
            put_str(buf, tag);
            put_str(buf, prop);
        }
        Expression::DstProperty { tag, prop } => {
            buf.push(T_DST_PROP);
            put_str(buf, tag);
            put_str(buf, prop);
        }
        Expression::EdgeSrc { edge } => {
            buf.push(T_EDGE_SRC);
            put_str(buf, edge);
        }
        Expression::EdgeDst { edge } => {
            buf.push(T_EDGE_DST);
            put_str(buf, edge);
        }
        Expression::EdgeTypeOf { edge } => {
            buf.push(T_EDGE_TYPE);
            put_str(buf, edge);
        }
        Expression::EdgeRank { edge } => {
            buf.push(T_EDGE_RANK);
            put_str(buf, edge);
        }
        Expression::LabelAttribute { label, attr } => {
            buf.push(T_LABEL_ATTR);
            put_str(buf, label);
            put_str(buf, attr);
        }
        Expression::Unary { op, operand } => {
            buf.push(T_UNARY);
            buf.push(match op {
                UnaryOp::Not => 0x00,
                UnaryOp::Negate => 0x01,
            });
            encode_into(operand, buf);
        }
        Expression::Arithmetic { op, left, right } => {
            buf.push(T_ARITHMETIC);
            buf.push(match op {
                ArithOp::Add => 0x00,
                ArithOp::Sub => 0x01,
                ArithOp::Mul => 0x02,
                ArithOp::Div => 0x03,
                ArithOp::Mod => 0x04,
            });
            encode_into(left, buf);
            encode_into(right, buf);
        }
        Expression::Relational { op, left, right } => {
            buf.push(T_RELATIONAL);
            buf.push(rel_op_byte(*op));
            encode_into(left, buf);
            encode_into(right, buf);
        }
        Expression::Logical { op, operands } => {
            buf.push(T_LOGICAL);
            buf.push(match op {
                LogicalOp::And => 0x00,
                LogicalOp::Or => 0x01,
            });
            buf.extend_from_slice(&(operands.len() as u32).to_le_bytes());
            for operand in operands {
                encode_into(operand, buf);
            }
        }
        Expression::Subscript { collection, index } => {
            buf.push(T_SUBSCRIPT);
            encode_into(collection, buf);
            encode_into(index, buf);
        }
        Expression::FunctionCall { name, args } => {
            buf.push(T_FUNCTION);
            put_str(buf, name);
            buf.extend_from_slice(&(args.len() as u32).to_le_bytes());
            for arg in args {
                encode_into(arg, buf);
            }
        }
        Expression::ListLiteral(items) => {
            buf.push(T_LIST);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_into(item, buf);
            }
        }
        Expression::SetLiteral(items) => {
            buf.push(T_SET);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_into(item, buf);
            }
        }
        Expression::MapLiteral(entries) => {
            buf.push(T_MAP);
            buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (k, v) in entries {
                put_str(buf, k);
                encode_into(v, buf);
            }
        }
    }
}

fn rel_op_byte(op: RelOp) -> u8 {
    match op {
        RelOp::Eq => 0x00,
        RelOp::Ne => 0x01,
        RelOp::Lt => 0x02,
        RelOp::Le => 0x03,
        RelOp::Gt => 0x04,
        RelOp::Ge => 0x05,
        RelOp::In => 0x06,
        RelOp::Contains => 0x07,
        RelOp::StartsWith => 0x08,
        RelOp::EndsWith => 0x09,
    }
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Empty => buf.push(V_EMPTY),
        Value::Null => buf.push(V_NULL),
        Value::Bool(v) => {
            buf.push(V_BOOL);
            buf.push(u8::from(*v));
        }
        Value::Int(v) => {
            buf.push(V_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float(v) => {
            buf.push(V_FLOAT);
            buf.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        Value::Str(v) => {
            buf.push(V_STR);
            put_str(buf, v);
        }
        Value::Timestamp(v) => {
            buf.push(V_TIMESTAMP);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::List(items) => {
            buf.push(V_LIST);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(item, buf);
            }
        }
        Value::Set(items) => {
            buf.push(V_SET);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(item, buf);
            }
        }
        Value::Map(entries) => {
            buf.push(V_MAP);
            buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (k, v) in entries {
                put_str(buf, k);
                encode_value(v, buf);
            }
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.bytes.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if self.pos + n > self.bytes.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(arr))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

fn decode_node(r: &mut Reader<'_>) -> Result<Expression, CodecError> {
    match r.u8()? {
        T_CONSTANT => Ok(Expression::Constant(decode_value(r)?)),
        T_VARIABLE => Ok(Expression::Variable(r.string()?)),
        T_INPUT_PROP => Ok(Expression::InputProperty(r.string()?)),
        T_TAG_PROP => Ok(Expression::TagProperty { tag: r.string()?, prop: r.string()? }),
        T_EDGE_PROP => Ok(Expression::EdgeProperty { edge: r.string()?, prop: r.string()? }),
        T_SRC_PROP => Ok(Expression::SrcProperty { tag: r.string()?, prop: r.string()? }),
        T_DST_PROP => Ok(Expression::DstProperty { tag: r.string()?, prop: r.string()? }),
        T_EDGE_SRC => Ok(Expression::EdgeSrc { edge: r.string()? }),
        T_EDGE_DST => Ok(Expression::EdgeDst { edge: r.string()? }),
        T_EDGE_TYPE => Ok(Expression::EdgeTypeOf { edge: r.string()? }),
        T_EDGE_RANK => Ok(Expression::EdgeRank { edge: r.string()? }),
        T_LABEL_ATTR => Ok(Expression::LabelAttribute { label: r.string()?, attr: r.string()? }),
        T_UNARY => {
            let op = match r.u8()? {
                0x00 => UnaryOp::Not,
                0x01 => UnaryOp::Negate,
                other => return Err(CodecError::UnknownOp(other)),
            };
            Ok(Expression::Unary { op, operand: Box::new(decode_node(r)?) })
        }
        T_ARITHMETIC => {
            let op = match r.u8()? {
                0x00 => ArithOp::Add,
                0x01 => ArithOp::Sub,
                0x02 => ArithOp::Mul,
                0x03 => ArithOp::Div,
                0x04 => ArithOp::Mod,
                other => return Err(CodecError::UnknownOp(other)),
            };
            let left = Box::new(decode_node(r)?);
            let right = Box::new(decode_node(r)?);
            Ok(Expression::Arithmetic { op, left, right })
        }
        T_RELATIONAL => {
            let op = match r.u8()? {
                0x00 => RelOp::Eq,
                0x01 => RelOp::Ne,
                0x02 => RelOp::Lt,
                0x03 => RelOp::Le,
                0x04 => RelOp::Gt,
                0x05 => RelOp::Ge,
                0x06 => RelOp::In,
                0x07 => RelOp::Contains,
                0x08 => RelOp::StartsWith,
                0x09 => RelOp::EndsWith,
                other => return Err(CodecError::UnknownOp(other)),
            };
            let left = Box::new(decode_node(r)?);
            let right = Box::new(decode_node(r)?);
            Ok(Expression::Relational { op, left, right })
        }
        T_LOGICAL => {
            let op = match r.u8()? {
                0x00 => LogicalOp::And,
                0x01 => LogicalOp::Or,
                other => return Err(CodecError::UnknownOp(other)),
            };
            let count = r.u32()? as usize;
            let mut operands = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                operands.push(decode_node(r)?);
            }
            Ok(Expression::Logical { op, operands })
        }
        T_SUBSCRIPT => {
            let collection = Box::new(decode_node(r)?);
            let index = Box::new(decode_node(r)?);
            Ok(Expression::Subscript { collection, index })
        }
        T_FUNCTION => {
            let name = r.string()?;
            let count = r.u32()? as usize;
            let mut args = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                args.push(decode_node(r)?);
            }
            Ok(Expression::FunctionCall { name, args })
        }
        tag @ (T_LIST | T_SET) => {
            let count = r.u32()? as usize;
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                items.push(decode_node(r)?);
            }
            Ok(if tag == T_LIST {
                Expression::ListLiteral(items)
            } else {
                Expression::SetLiteral(items)
            })
        }
        T_MAP => {
            let count = r.u32()? as usize;
            let mut entries = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let k = r.string()?;
                entries.push((k, decode_node(r)?));
            }
            Ok(Expression::MapLiteral(entries))
        }
        other => Err(CodecError::UnknownExprTag(other)),
    }
}

fn decode_value(r: &mut Reader<'_>) -> Result<Value, CodecError> {
    match r.u8()? {
        V_EMPTY => Ok(Value::Empty),
        V_NULL => Ok(Value::Null),
        V_BOOL => Ok(Value::Bool(r.u8()? != 0)),
        V_INT => Ok(Value::Int(r.i64()?)),
        V_FLOAT => {
            let bits = r.i64()? as u64;
            Ok(Value::Float(f64::from_bits(bits)))
        }
        V_STR => Ok(Value::Str(r.string()?)),
        V_TIMESTAMP => Ok(Value::Timestamp(r.i64()?)),
        tag @ (V_LIST | V_SET) => {
            let count = r.u32()? as usize;
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                items.push(decode_value(r)?);
            }
            Ok(if tag == V_LIST { Value::List(items) } else { Value::Set(items) })
        }
        V_MAP => {
            let count = r.u32()? as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let k = r.string()?;
                entries.insert(k, decode_value(r)?);
            }
            Ok(Value::Map(entries))
        }
        other => Err(CodecError::UnknownValueTag(other)),
    }
}
