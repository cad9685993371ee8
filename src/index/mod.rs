//! # Secondary Indexes
//!
//! Index metadata ([`IndexItem`]), hint-to-key-range translation for the
//! scan side, and the optimizer-side selector ([`select`]) that maps a
//! boolean filter plus candidate indexes to column hints and a residual
//! filter.
//!
//! Index entries are ordered by the encoded column values, so a prefix on
//! the leading columns followed by a range on one trailing column is one
//! contiguous key range per partition.

pub mod select;

pub use select::{find_optimal_index, merge_bounds, Bound, SelectedIndex};

use crate::keys;
use crate::protocol::{ColumnHint, ScanType, SchemaRef};
use crate::value::{DataType, Value};
use crate::IndexId;
use thiserror::Error;

/// Default fixed width for string index columns.
pub const DEFAULT_STRING_INDEX_LEN: usize = 64;

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Hint references column '{0}' not in the index column order")]
    UnknownColumn(String),
    #[error("Hints must be a prefix of the index column order (got '{0}' out of order)")]
    OutOfOrder(String),
    #[error("Range scan for bool type is illegal")]
    BoolRangeScan,
    #[error("Hint for column '{column}' carries no usable bound")]
    EmptyHint { column: String },
    #[error("Value {value} cannot be encoded for a {dtype} column")]
    BadValue { value: String, dtype: DataType },
}

/// One indexed column: name, type, and the fixed encoded width for
/// strings.
#[derive(Debug, Clone)]
pub struct IndexFieldDef {
    pub name: String,
    pub dtype: DataType,
    pub str_len: usize,
}

impl IndexFieldDef {
    pub fn new(name: &str, dtype: DataType) -> Self {
        IndexFieldDef { name: name.to_string(), dtype, str_len: DEFAULT_STRING_INDEX_LEN }
    }
}

/// Catalog description of one index over a tag or edge schema.
#[derive(Debug, Clone)]
pub struct IndexItem {
    pub index_id: IndexId,
    pub name: String,
    pub schema: SchemaRef,
    /// Declared column order; hints always bind a strict prefix of it.
    pub fields: Vec<IndexFieldDef>,
}

impl IndexItem {
    pub fn field(&self, name: &str) -> Option<&IndexFieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A resolved physical scan interval inside one partition's index range:
/// `[begin, end)`, with `end = None` meaning "to the end of the index
/// prefix".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInterval {
    pub begin: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

/// Translate column hints into the byte interval they cover for one
/// partition. Validates the invariants the selector promises: hints bind
/// a strict prefix of the column order, and only the last hint may be a
/// range. A `None` return means the interval is provably empty.
pub fn hint_interval(
    part: crate::PartitionId,
    item: &IndexItem,
    hints: &[ColumnHint],
) -> Result<Option<KeyInterval>, IndexError> {
    let base = keys::index_prefix(part, item.index_id);
    let mut begin = base.clone();
    let mut end: Option<Vec<u8>> = None;

    for (pos, hint) in hints.iter().enumerate() {
        let field = item
            .field(&hint.column_name)
            .ok_or_else(|| IndexError::UnknownColumn(hint.column_name.clone()))?;
        if item.fields[pos].name != hint.column_name {
            return Err(IndexError::OutOfOrder(hint.column_name.clone()));
        }
        match hint.scan_type {
            ScanType::Prefix => {
                let value = hint
                    .begin_value
                    .as_ref()
                    .ok_or_else(|| IndexError::EmptyHint { column: hint.column_name.clone() })?;
                begin.extend_from_slice(&encode_column(value, field)?);
            }
            ScanType::Range => {
                if field.dtype == DataType::Bool {
                    return Err(IndexError::BoolRangeScan);
                }
                if hint.begin_value.is_none() && hint.end_value.is_none() {
                    return Err(IndexError::EmptyHint { column: hint.column_name.clone() });
                }
                // Bounds extend the shared column prefix accumulated so far.
                let stem = begin.clone();
                if let Some(value) = &hint.end_value {
                    let encoded = encode_column(value, field)?;
                    if hint.include_end {
                        match keys::increment_fixed(&encoded) {
                            Some(next) => {
                                let mut limit = stem.clone();
                                limit.extend_from_slice(&next);
                                end = Some(limit);
                            }
                            // max encodable value: run to the end of the stem
                            None => end = keys::prefix_end(&stem),
                        }
                    } else {
                        let mut limit = stem.clone();
                        limit.extend_from_slice(&encoded);
                        end = Some(limit);
                    }
                } else {
                    end = keys::prefix_end(&stem);
                }
                if let Some(value) = &hint.begin_value {
                    let encoded = encode_column(value, field)?;
                    if hint.include_begin {
                        begin.extend_from_slice(&encoded);
                    } else {
                        match keys::increment_fixed(&encoded) {
                            Some(next) => begin.extend_from_slice(&next),
                            // begin is exclusive of the max value: empty
                            None => return Ok(None),
                        }
                    }
                }
                break;
            }
        }
    }

    if end.is_none() {
        end = keys::prefix_end(&begin);
    }
    if let Some(limit) = &end {
        if *limit <= begin {
            return Ok(None);
        }
    }
    Ok(Some(KeyInterval { begin, end }))
}

fn encode_column(value: &Value, field: &IndexFieldDef) -> Result<Vec<u8>, IndexError> {
    keys::encode_index_value(value, field.dtype, field.str_len).ok_or_else(|| {
        IndexError::BadValue { value: value.to_string(), dtype: field.dtype }
    })
}

/// Encode a full index entry's column section for a row (fixture/test
/// side; the write path lives elsewhere). `None` when a column value is
/// null or of the wrong type - such rows produce no index entry.
pub fn encode_row_columns(
    item: &IndexItem,
    get: &dyn Fn(&str) -> Value,
) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for field in &item.fields {
        let value = get(&field.name);
        out.extend_from_slice(&keys::encode_index_value(&value, field.dtype, field.str_len)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> IndexItem {
        IndexItem {
            index_id: 9,
            name: "player_index".into(),
            schema: SchemaRef::Tag(1),
            fields: vec![
                IndexFieldDef::new("age", DataType::Int),
                IndexFieldDef::new("name", DataType::String),
            ],
        }
    }

    fn prefix_hint(col: &str, v: Value) -> ColumnHint {
        ColumnHint::prefix(col, v)
    }

    fn range_hint(
        col: &str,
        begin: Option<(Value, bool)>,
        end: Option<(Value, bool)>,
    ) -> ColumnHint {
        let (begin_value, include_begin) = match begin {
            Some((v, i)) => (Some(v), i),
            None => (None, false),
        };
        let (end_value, include_end) = match end {
            Some((v, i)) => (Some(v), i),
            None => (None, false),
        };
        ColumnHint {
            column_name: col.to_string(),
            scan_type: ScanType::Range,
            begin_value,
            include_begin,
            end_value,
            include_end,
        }
    }

    #[test]
    fn prefix_hint_interval_covers_exact_value() {
        let item = item();
        let hints = vec![prefix_hint("age", Value::Int(30))];
        let interval = hint_interval(1, &item, &hints).expect("ok").expect("nonempty");
        let inside = {
            let mut cols = keys::encode_index_value(&Value::Int(30), DataType::Int, 0).unwrap();
            cols.extend_from_slice(b"tail");
            keys::index_key(1, 9, &cols, b"")
        };
        assert!(interval.begin <= inside);
        assert!(interval.end.expect("bounded").as_slice() > inside.as_slice());
    }

    #[test]
    fn half_open_range_excludes_end() {
        let item = item();
        let hints = vec![range_hint(
            "age",
            Some((Value::Int(15), true)),
            Some((Value::Int(64), false)),
        )];
        let interval = hint_interval(1, &item, &hints).expect("ok").expect("nonempty");
        let at15 = keys::index_key(
            1,
            9,
            &keys::encode_index_value(&Value::Int(15), DataType::Int, 0).unwrap(),
            b"",
        );
        let at64 = keys::index_key(
            1,
            9,
            &keys::encode_index_value(&Value::Int(64), DataType::Int, 0).unwrap(),
            b"",
        );
        assert!(interval.begin <= at15);
        let end = interval.end.expect("bounded");
        assert!(end.as_slice() <= at64.as_slice());
    }

    #[test]
    fn bool_range_is_rejected() {
        let item = IndexItem {
            index_id: 1,
            name: "flags".into(),
            schema: SchemaRef::Tag(1),
            fields: vec![IndexFieldDef::new("flag", DataType::Bool)],
        };
        let hints = vec![range_hint("flag", Some((Value::Bool(false), true)), None)];
        assert!(matches!(
            hint_interval(1, &item, &hints),
            Err(IndexError::BoolRangeScan)
        ));
    }

    #[test]
    fn out_of_order_hint_is_rejected() {
        let item = item();
        let hints = vec![prefix_hint("name", Value::Str("x".into()))];
        assert!(matches!(
            hint_interval(1, &item, &hints),
            Err(IndexError::OutOfOrder(_))
        ));
    }

    #[test]
    fn empty_interval_is_none() {
        let item = item();
        let hints = vec![range_hint(
            "age",
            Some((Value::Int(64), true)),
            Some((Value::Int(15), false)),
        )];
        assert_eq!(hint_interval(1, &item, &hints).expect("ok"), None);
    }
}
