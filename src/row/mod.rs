//! # Row Blob Reader and Writer
//!
//! Decodes a value blob against a versioned schema; the writer side exists
//! for fixtures and tests (the real write path lives in another service).
//!
//! Blob layout:
//!
//! ```text
//! [u16 LE schema version][i64 LE insert timestamp]
//! [null bitmap, ceil(fields/8) bytes][fixed cells][variable region]
//! ```
//!
//! Fixed cells: bool 1 byte; int/float/timestamp 8 bytes LE; string 8
//! bytes (u32 LE absolute offset + u32 LE length into the blob). A row
//! written under schema version `v` carries only that version's fields;
//! reading a later field yields its declared default, or null when the
//! field is nullable.

use crate::schema::{Schema, SchemaVersions, TtlInfo};
use crate::value::{DataType, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RowError {
    #[error("Row blob truncated ({len} bytes)")]
    Truncated { len: usize },
    #[error("Row written with unknown schema version {0}")]
    UnknownVersion(u16),
    #[error("Unknown field: '{0}'")]
    UnknownField(String),
    #[error("Field '{field}' expects {expected}, got {got}")]
    TypeMismatch { field: String, expected: DataType, got: String },
    #[error("Field '{0}' has no value, no default, and is not nullable")]
    MissingValue(String),
}

const VER_LEN: usize = 2;
const TS_LEN: usize = 8;

fn cell_width(dtype: DataType) -> usize {
    match dtype {
        DataType::Bool => 1,
        DataType::Int | DataType::Float | DataType::Timestamp | DataType::String => 8,
    }
}

/// Decoded view over one row blob. Cheap to construct; decoding happens
/// per accessed field.
pub struct RowReader<'a> {
    row_schema: &'a Schema,
    latest: &'a Schema,
    blob: &'a [u8],
    bitmap_off: usize,
    fixed_off: usize,
}

impl<'a> RowReader<'a> {
    pub fn open(versions: &'a SchemaVersions, blob: &'a [u8]) -> Result<Self, RowError> {
        if blob.len() < VER_LEN + TS_LEN {
            return Err(RowError::Truncated { len: blob.len() });
        }
        let version = u16::from_le_bytes([blob[0], blob[1]]);
        let row_schema = versions
            .by_version(version)
            .map_err(|_| RowError::UnknownVersion(version))?;
        let bitmap_off = VER_LEN + TS_LEN;
        let bitmap_len = row_schema.field_count().div_ceil(8);
        let fixed_off = bitmap_off + bitmap_len;
        let fixed_len: usize = row_schema.fields.iter().map(|f| cell_width(f.dtype)).sum();
        if blob.len() < fixed_off + fixed_len {
            return Err(RowError::Truncated { len: blob.len() });
        }
        Ok(RowReader { row_schema, latest: versions.latest(), blob, bitmap_off, fixed_off })
    }

    pub fn schema(&self) -> &Schema {
        self.latest
    }

    /// Insert timestamp (epoch seconds) stamped when the row was written.
    pub fn insert_ts(&self) -> i64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&self.blob[VER_LEN..VER_LEN + TS_LEN]);
        i64::from_le_bytes(arr)
    }

    /// Whether the row falls inside a scan's `[start, end)` time window.
    pub fn visible_in(&self, start: Option<i64>, end: Option<i64>) -> bool {
        let ts = self.insert_ts();
        start.is_none_or(|s| ts >= s) && end.is_none_or(|e| ts < e)
    }

    /// TTL check against the row schema (or an override from the mock TTL
    /// config hooks). An expired row must be treated as absent.
    pub fn is_expired(&self, ttl_override: Option<&TtlInfo>, now: i64) -> bool {
        let Some(ttl) = ttl_override.or(self.row_schema.ttl.as_ref()) else {
            return false;
        };
        match self.get(&ttl.col).as_i64() {
            Some(base) => base.saturating_add(ttl.duration_secs) <= now,
            None => false,
        }
    }

    /// Field by name. Fields beyond the row's schema version fall back to
    /// the latest schema's default (or null); unknown names yield `Empty`
    /// (validation happens at request build time).
    pub fn get(&self, name: &str) -> Value {
        if let Some(idx) = self.row_schema.field_index(name) {
            return self.read_cell(idx);
        }
        match self.latest.field(name) {
            Some(field) => match field.default_value() {
                Some(v) => v.clone(),
                None => Value::Null,
            },
            None => Value::Empty,
        }
    }

    /// All fields of the latest schema, in schema order.
    pub fn all(&self) -> Vec<(String, Value)> {
        self.latest
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.get(&f.name)))
            .collect()
    }

    fn is_null(&self, idx: usize) -> bool {
        let byte = self.blob[self.bitmap_off + idx / 8];
        byte & (1 << (idx % 8)) != 0
    }

    fn read_cell(&self, idx: usize) -> Value {
        if self.is_null(idx) {
            return Value::Null;
        }
        let mut off = self.fixed_off;
        for field in &self.row_schema.fields[..idx] {
            off += cell_width(field.dtype);
        }
        let field = &self.row_schema.fields[idx];
        match field.dtype {
            DataType::Bool => Value::Bool(self.blob[off] != 0),
            DataType::Int => Value::Int(self.read_i64(off)),
            DataType::Timestamp => Value::Timestamp(self.read_i64(off)),
            DataType::Float => Value::Float(f64::from_bits(self.read_i64(off) as u64)),
            DataType::String => {
                let str_off = self.read_u32(off) as usize;
                let str_len = self.read_u32(off + 4) as usize;
                if str_off + str_len > self.blob.len() {
                    return Value::Empty;
                }
                match std::str::from_utf8(&self.blob[str_off..str_off + str_len]) {
                    Ok(s) => Value::Str(s.to_string()),
                    Err(_) => Value::Empty,
                }
            }
        }
    }

    fn read_i64(&self, off: usize) -> i64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&self.blob[off..off + 8]);
        i64::from_le_bytes(arr)
    }

    fn read_u32(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.blob[off],
            self.blob[off + 1],
            self.blob[off + 2],
            self.blob[off + 3],
        ])
    }
}

/// Builds a row blob under one schema version. Fixture/test side only.
pub struct RowWriter<'a> {
    schema: &'a Schema,
    insert_ts: i64,
    values: Vec<Option<Value>>,
}

impl<'a> RowWriter<'a> {
    pub fn new(schema: &'a Schema, insert_ts: i64) -> Self {
        RowWriter { schema, insert_ts, values: vec![None; schema.field_count()] }
    }

    pub fn set(mut self, name: &str, value: Value) -> Result<Self, RowError> {
        let idx = self
            .schema
            .field_index(name)
            .ok_or_else(|| RowError::UnknownField(name.to_string()))?;
        let field = &self.schema.fields[idx];
        let coerced = match (field.dtype, value) {
            (_, Value::Null) if field.nullable => Value::Null,
            (DataType::Bool, v @ Value::Bool(_)) => v,
            (DataType::Int, v @ Value::Int(_)) => v,
            (DataType::Float, v @ Value::Float(_)) => v,
            (DataType::Float, Value::Int(i)) => Value::Float(i as f64),
            (DataType::Timestamp, Value::Timestamp(t) | Value::Int(t)) => Value::Timestamp(t),
            (DataType::String, v @ Value::Str(_)) => v,
            (dtype, v) => {
                return Err(RowError::TypeMismatch {
                    field: name.to_string(),
                    expected: dtype,
                    got: format!("{v}"),
                })
            }
        };
        self.values[idx] = Some(coerced);
        Ok(self)
    }

    pub fn finish(self) -> Result<Vec<u8>, RowError> {
        let field_count = self.schema.field_count();
        let bitmap_len = field_count.div_ceil(8);
        let fixed_len: usize = self.schema.fields.iter().map(|f| cell_width(f.dtype)).sum();
        let fixed_off = VER_LEN + TS_LEN + bitmap_len;

        let mut resolved = Vec::with_capacity(field_count);
        for (idx, field) in self.schema.fields.iter().enumerate() {
            let value = match &self.values[idx] {
                Some(v) => v.clone(),
                None => match field.default_value() {
                    Some(v) => v.clone(),
                    None if field.nullable => Value::Null,
                    None => return Err(RowError::MissingValue(field.name.clone())),
                },
            };
            resolved.push(value);
        }

        let mut blob = Vec::with_capacity(fixed_off + fixed_len);
        blob.extend_from_slice(&self.schema.version.to_le_bytes());
        blob.extend_from_slice(&self.insert_ts.to_le_bytes());
        blob.resize(VER_LEN + TS_LEN + bitmap_len, 0);
        blob.resize(fixed_off + fixed_len, 0);

        let mut var_region: Vec<u8> = Vec::new();
        let mut off = fixed_off;
        for (idx, (field, value)) in self.schema.fields.iter().zip(&resolved).enumerate() {
            let width = cell_width(field.dtype);
            match value {
                Value::Null => {
                    blob[VER_LEN + TS_LEN + idx / 8] |= 1 << (idx % 8);
                }
                Value::Bool(v) => blob[off] = u8::from(*v),
                Value::Int(v) | Value::Timestamp(v) => {
                    blob[off..off + 8].copy_from_slice(&v.to_le_bytes());
                }
                Value::Float(v) => {
                    blob[off..off + 8].copy_from_slice(&v.to_bits().to_le_bytes());
                }
                Value::Str(s) => {
                    let str_off = fixed_off + fixed_len + var_region.len();
                    blob[off..off + 4].copy_from_slice(&(str_off as u32).to_le_bytes());
                    blob[off + 4..off + 8].copy_from_slice(&(s.len() as u32).to_le_bytes());
                    var_region.extend_from_slice(s.as_bytes());
                }
                // set() only admits the scalar types above
                _ => {}
            }
            off += width;
        }
        blob.extend_from_slice(&var_region);
        Ok(blob)
    }
}
