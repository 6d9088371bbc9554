//! Schema Module
//!
//! Column layout registered once per engine instance.
//!
//! ## Responsibilities
//! - Tagged-variant cell values (`Value`, `ValueType`)
//! - Ordered `(name, type)` column list derived once at bulk load
//! - Shape checks for inserted and updated rows
//!
//! After registration the engine never inspects caller types again; every
//! later row is checked against the stored `Schema`.

mod record;
mod value;

pub use record::Record;
pub use value::{Value, ValueType};

use crate::error::{FrameError, Result};

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: ValueType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered column list shared by every row of an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

/// Caller types that register their column layout up front
///
/// Implemented by the caller's row structs so bulk loads never need to
/// discover fields from values.
pub trait Tabular {
    /// Columns shared by all values of this type, in record order
    fn fields() -> Vec<Field>;

    /// Convert one value into a record in `schema()` order
    fn into_record(self) -> Record;
}

impl Schema {
    /// Build a schema from an explicit field list
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(FrameError::SchemaMismatch(
                "schema must have at least one column".to_string(),
            ));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(FrameError::SchemaMismatch(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Derive the schema of a homogeneous batch of records
    ///
    /// Column names and order come from the first record. A column's type
    /// is the type of its first non-null value; a column that is null in
    /// every record is typed `Text`. Every record must then match.
    pub fn infer(records: &[Record]) -> Result<Self> {
        let first = records.first().ok_or(FrameError::EmptyInput)?;

        let mut fields = Vec::with_capacity(first.len());
        for (column, (name, _)) in first.iter().enumerate() {
            let ty = records
                .iter()
                .filter_map(|r| r.iter().nth(column).and_then(|(_, v)| v.value_type()))
                .next()
                .unwrap_or(ValueType::Text);
            fields.push(Field::new(name, ty));
        }

        let schema = Self::new(fields)?;
        for (i, record) in records.iter().enumerate() {
            schema
                .check_record(record)
                .map_err(|e| FrameError::SchemaMismatch(format!("record {}: {}", i, e)))?;
        }
        Ok(schema)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ordinal position of a column
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check that a full row has exactly this schema's columns, in order
    pub fn check_record(&self, record: &Record) -> std::result::Result<(), String> {
        if record.len() != self.fields.len() {
            return Err(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                record.len()
            ));
        }
        for (field, (name, value)) in self.fields.iter().zip(record.iter()) {
            if field.name != name {
                return Err(format!("expected field '{}', got '{}'", field.name, name));
            }
            if !value.fits(field.ty) {
                return Err(format!(
                    "field '{}' expects {}, got {:?}",
                    field.name, field.ty, value
                ));
            }
        }
        Ok(())
    }

    /// Check a partial row used by updates: every field must exist and fit
    pub fn check_partial(&self, record: &Record) -> Result<()> {
        for (name, value) in record.iter() {
            let field = self
                .position(name)
                .map(|i| &self.fields[i])
                .ok_or_else(|| FrameError::SchemaMismatch(format!("unknown field '{}'", name)))?;
            if !value.fits(field.ty) {
                return Err(FrameError::SchemaMismatch(format!(
                    "field '{}' expects {}, got {:?}",
                    field.name, field.ty, value
                )));
            }
        }
        Ok(())
    }

    /// Check a full row, wrapping failures as `SchemaMismatch`
    pub fn validate(&self, record: &Record) -> Result<()> {
        self.check_record(record).map_err(FrameError::SchemaMismatch)
    }
}
