//! # Value Type System
//!
//! Core value types flowing through the query engine: `Value`, `DataType`,
//! `Row`, and `DataSet`.
//!
//! Two "absent" variants exist and are deliberately distinct:
//!
//! - [`Value::Null`] - a property that is present in the schema but has no
//!   value for this row.
//! - [`Value::Empty`] - no meaningful value at all: the result of comparing
//!   incompatible types, or of projecting a tag the vertex does not carry.
//!
//! A filter admits a row only when it evaluates to exactly `Bool(true)`;
//! both `Null` and `Empty` reject.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Logical types a schema field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
    /// Seconds since the epoch. Stored like `Int` but kept distinct so TTL
    /// columns can be validated at schema registration.
    Timestamp,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

/// A runtime value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Empty,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(i64),
    List(Vec<Value>),
    /// Deduplicated and order-normalized at construction (constant folding).
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value is exactly `Bool(true)`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_empty_value(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// The declared type this value satisfies, if it is a scalar.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Str(_) => Some(DataType::String),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and mixed comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) | Value::Timestamp(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Expression-level comparison. Numeric types compare across `Int`,
    /// `Float` and `Timestamp`; otherwise both sides must share a variant.
    /// Incompatible operands return `None`, which evaluation maps to
    /// [`Value::Empty`].
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Empty, Value::Empty) => Some(Ordering::Equal),
            (Value::Null | Value::Empty, _) | (_, Value::Null | Value::Empty) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => {
                compare_slices(a, b)
            }
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                Some(a.total_cmp(&b))
            }
        }
    }

    /// Total order used for sorting, top-N heaps and deterministic output.
    /// Values of different variants order by variant rank; this is a
    /// tie-breaking order, not the expression-level [`Value::compare`].
    pub fn total_order(&self, other: &Value) -> Ordering {
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        self.type_rank().cmp(&other.type_rank()).then_with(|| match (self, other) {
            (Value::Map(a), Value::Map(b)) => {
                a.len().cmp(&b.len()).then_with(|| {
                    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                        let ord = ka.cmp(kb).then_with(|| va.total_order(vb));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                })
            }
            _ => Ordering::Equal,
        })
    }

    /// JSON view of one value; `Empty` and `Null` both map to JSON null,
    /// non-finite floats to their decimal string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty | Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) | Value::Timestamp(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map_or_else(|| serde_json::Value::String(v.to_string()), serde_json::Value::Number),
            Value::Str(v) => serde_json::Value::String(v.clone()),
            Value::List(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Empty => 0,
            Value::Null => 1,
            Value::Bool(_) => 2,
            Value::Int(_) | Value::Float(_) | Value::Timestamp(_) => 3,
            Value::Str(_) => 4,
            Value::List(_) => 5,
            Value::Set(_) => 6,
            Value::Map(_) => 7,
        }
    }
}

fn compare_slices(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.compare(y)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(a.len().cmp(&b.len()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Empty | Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) | Value::Timestamp(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
            Value::List(v) | Value::Set(v) => v.hash(state),
            Value::Map(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "__EMPTY__"),
            Value::Null => write!(f, "__NULL__"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "\"{v}\""),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::List(items) => write_seq(f, "[", items, "]"),
            Value::Set(items) => write_seq(f, "{", items, "}"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row { values }
    }
}

/// A named-column result buffer. Per-partition plans fill one of these;
/// the dispatcher concatenates them in partition-id order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSet {
    pub column_names: Vec<String>,
    pub rows: Vec<Row>,
}

impl DataSet {
    pub fn new(column_names: Vec<String>) -> Self {
        DataSet { column_names, rows: Vec::new() }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append all rows of `other`, keeping this data set's column names.
    pub fn append(&mut self, mut other: DataSet) {
        if self.column_names.is_empty() {
            self.column_names = other.column_names;
        }
        self.rows.append(&mut other.rows);
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// Render as JSON for debug endpoints and logs: one object per row,
    /// keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let entries: serde_json::Map<String, serde_json::Value> = self
                    .column_names
                    .iter()
                    .zip(&row.values)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                serde_json::Value::Object(entries)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}
