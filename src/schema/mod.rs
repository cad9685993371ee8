//! # Tag and Edge Schemas
//!
//! Versioned field layouts for tags and edge types. A row is written under
//! one schema version and decoded with exactly that version; versions only
//! ever append fields, so an old row is readable under its own version and
//! missing later fields fall back to defaults.

use crate::expr::{fold_constant, Expression};
use crate::value::{DataType, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Duplicate field name: '{0}'")]
    DuplicateField(String),
    #[error("TTL column '{0}' not found in schema")]
    TtlColumnNotFound(String),
    #[error("TTL column '{col}' must be int or timestamp, found {found}")]
    TtlColumnType { col: String, found: DataType },
    #[error("Default for field '{field}' is not a constant expression")]
    NonConstantDefault { field: String },
    #[error("Schema version {version} out of range (have {count})")]
    VersionOutOfRange { version: u16, count: usize },
}

/// One named, typed field of a tag or edge schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub dtype: DataType,
    pub nullable: bool,
    /// Closed expression producing the value of this field when a row
    /// predates it. Folded to [`FieldDef::folded_default`] at registration.
    pub default: Option<Expression>,
    folded_default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: &str, dtype: DataType) -> Self {
        FieldDef {
            name: name.to_string(),
            dtype,
            nullable: false,
            default: None,
            folded_default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: Expression) -> Self {
        self.default = Some(default);
        self
    }

    /// The default value for a row missing this field, already folded.
    pub fn default_value(&self) -> Option<&Value> {
        self.folded_default.as_ref()
    }
}

/// TTL declaration: rows whose `col + duration_secs` is in the past are
/// treated as absent by every reader.
#[derive(Debug, Clone)]
pub struct TtlInfo {
    pub col: String,
    pub duration_secs: i64,
}

/// One version of a tag or edge schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: u16,
    pub fields: Vec<FieldDef>,
    pub ttl: Option<TtlInfo>,
}

impl Schema {
    /// Validate and seal a schema version: checks field-name uniqueness and
    /// the TTL column, and folds every default to a constant.
    pub fn new(
        version: u16,
        mut fields: Vec<FieldDef>,
        ttl: Option<TtlInfo>,
    ) -> Result<Self, SchemaError> {
        for i in 0..fields.len() {
            for j in (i + 1)..fields.len() {
                if fields[i].name == fields[j].name {
                    return Err(SchemaError::DuplicateField(fields[i].name.clone()));
                }
            }
        }
        if let Some(ttl) = &ttl {
            let col = fields
                .iter()
                .find(|f| f.name == ttl.col)
                .ok_or_else(|| SchemaError::TtlColumnNotFound(ttl.col.clone()))?;
            if !matches!(col.dtype, DataType::Int | DataType::Timestamp) {
                return Err(SchemaError::TtlColumnType {
                    col: ttl.col.clone(),
                    found: col.dtype,
                });
            }
        }
        for field in &mut fields {
            if let Some(default) = &field.default {
                let folded = fold_constant(default)
                    .ok_or_else(|| SchemaError::NonConstantDefault { field: field.name.clone() })?;
                field.folded_default = Some(folded);
            }
        }
        Ok(Schema { version, fields, ttl })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// All versions of one tag or edge schema, oldest first. The newest version
/// is the write schema; readers pick by the version stored in the row.
#[derive(Debug, Clone)]
pub struct SchemaVersions {
    versions: Vec<Schema>,
}

impl SchemaVersions {
    pub fn new(first: Schema) -> Self {
        SchemaVersions { versions: vec![first] }
    }

    pub fn push(&mut self, schema: Schema) {
        self.versions.push(schema);
    }

    pub fn latest(&self) -> &Schema {
        // invariant: constructed with at least one version
        &self.versions[self.versions.len() - 1]
    }

    pub fn by_version(&self, version: u16) -> Result<&Schema, SchemaError> {
        self.versions
            .iter()
            .find(|s| s.version == version)
            .ok_or(SchemaError::VersionOutOfRange { version, count: self.versions.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_fields() {
        let fields = vec![
            FieldDef::new("name", DataType::String),
            FieldDef::new("name", DataType::Int),
        ];
        assert!(matches!(
            Schema::new(0, fields, None),
            Err(SchemaError::DuplicateField(_))
        ));
    }

    #[test]
    fn rejects_bad_ttl_column() {
        let fields = vec![FieldDef::new("name", DataType::String)];
        let ttl = Some(TtlInfo { col: "name".into(), duration_secs: 10 });
        assert!(matches!(
            Schema::new(0, fields, ttl),
            Err(SchemaError::TtlColumnType { .. })
        ));
    }

    #[test]
    fn folds_defaults_at_registration() {
        let default = Expression::constant(Value::Int(40)).add(Expression::constant(Value::Int(2)));
        let fields = vec![FieldDef::new("age", DataType::Int).with_default(default)];
        let schema = Schema::new(0, fields, None).unwrap();
        assert_eq!(schema.fields[0].default_value(), Some(&Value::Int(42)));
    }
}
