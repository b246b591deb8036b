//! Schema and metadata types for database tables, columns, indexes, and constraints.
//!
//! These types provide a database-agnostic representation of schema metadata
//! used throughout the migration process.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::Hash;
use uuid::Uuid;

use super::value::SqlValue;

/// Represents a primary key value of various types.
///
/// This is the scalar cursor of a single-column keyset scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PkValue {
    /// Integer primary key (covers int, bigint, smallint, tinyint).
    Int(i64),
    /// UUID primary key.
    Uuid(Uuid),
    /// String primary key (varchar, char, text).
    String(String),
}

impl PkValue {
    /// Convert to a SQL literal string for use in queries.
    ///
    /// # Security Note
    ///
    /// This method performs basic SQL escaping (single quotes doubled) which is
    /// sufficient for typical primary key values (integers, UUIDs, short identifiers).
    /// It is used for the `pk > cursor` filter of keyset pagination.
    pub fn to_sql_literal(&self) -> String {
        match self {
            PkValue::Int(v) => v.to_string(),
            PkValue::Uuid(v) => format!("'{}'", v),
            PkValue::String(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }

    /// Extract a key from a row value. Returns `None` for NULL and for
    /// values that cannot be a key (floats, binary, temporal).
    pub fn from_sql_value(value: &SqlValue<'_>) -> Option<Self> {
        match value {
            SqlValue::I16(v) => Some(PkValue::Int(i64::from(*v))),
            SqlValue::I32(v) => Some(PkValue::Int(i64::from(*v))),
            SqlValue::I64(v) => Some(PkValue::Int(*v)),
            SqlValue::Uuid(v) => Some(PkValue::Uuid(*v)),
            SqlValue::Text(v) => Some(PkValue::String(v.to_string())),
            SqlValue::Decimal(v) if v.fract().is_zero() => v.to_i64().map(PkValue::Int),
            SqlValue::Decimal(v) => Some(PkValue::String(v.to_string())),
            _ => None,
        }
    }

    /// Parse the textual form of a key read back from the destination,
    /// guided by the destination column's type name.
    pub fn parse_for_type(text: &str, data_type: &str) -> Self {
        let lower = data_type.to_lowercase();
        if lower.contains("int") || (lower.starts_with("number(") && lower.ends_with(",0)")) {
            if let Ok(v) = text.trim().parse::<i64>() {
                return PkValue::Int(v);
            }
        }
        if lower.starts_with("uuid") {
            if let Ok(v) = Uuid::parse_str(text.trim()) {
                return PkValue::Uuid(v);
            }
        }
        PkValue::String(text.to_string())
    }
}

impl std::fmt::Display for PkValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::Uuid(v) => write!(f, "{}", v),
            PkValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<i32> for PkValue {
    fn from(v: i32) -> Self {
        PkValue::Int(v as i64)
    }
}

impl From<Uuid> for PkValue {
    fn from(v: Uuid) -> Self {
        PkValue::Uuid(v)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::String(v.to_string())
    }
}

/// Table metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions, in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,

    /// Unique constraints.
    pub unique_constraints: Vec<UniqueConstraint>,

    /// Check constraints.
    pub check_constraints: Vec<CheckConstraint>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,

    /// Non-primary key indexes.
    pub indexes: Vec<Index>,

    /// Row count at extraction time.
    pub row_count: i64,
}

impl Table {
    /// Create an empty table descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Check if the table has a single-column primary key.
    pub fn has_single_pk(&self) -> bool {
        self.primary_key.len() == 1
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column in the row layout.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in row order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Names of other tables this table references through foreign keys.
    pub fn referenced_tables(&self) -> BTreeSet<&str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.ref_table.as_str())
            .filter(|t| *t != self.name)
            .collect()
    }

    /// Whether any constraint besides the primary key is attached.
    pub fn has_secondary_constraints(&self) -> bool {
        !self.unique_constraints.is_empty()
            || !self.check_constraints.is_empty()
            || !self.foreign_keys.is_empty()
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type. Bare native name on the origin (e.g. "varchar", "number");
    /// a complete type expression after normalization (e.g. "VARCHAR(60)").
    pub data_type: String,

    /// Maximum length for string/binary types.
    pub max_length: Option<u32>,

    /// Numeric precision.
    pub precision: Option<u32>,

    /// Numeric scale.
    pub scale: Option<u32>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Server-side default expression.
    pub default: Option<String>,

    /// Whether the column is auto-generated (identity, serial, AUTO_INCREMENT).
    pub is_autoincrement: bool,

    /// Free-text column comment.
    pub comment: Option<String>,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Create a column with just a name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ..Default::default()
        }
    }
}

/// Unique constraint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,

    /// Constrained column names.
    pub columns: Vec<String>,
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed column names.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub is_unique: bool,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Local column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,

    /// ON DELETE action, when not the default.
    pub on_delete: Option<String>,

    /// ON UPDATE action, when not the default.
    pub on_update: Option<String>,
}

/// Check constraint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,

    /// Constraint definition (SQL boolean expression, without CHECK).
    pub definition: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn make_fk(name: &str, ref_table: &str) -> ForeignKey {
        ForeignKey {
            name: name.to_string(),
            columns: vec!["parent_id".to_string()],
            ref_table: ref_table.to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: None,
            on_update: None,
        }
    }

    #[test]
    fn test_pk_value_literals() {
        assert_eq!(PkValue::Int(42).to_sql_literal(), "42");
        assert_eq!(
            PkValue::Uuid(Uuid::nil()).to_sql_literal(),
            "'00000000-0000-0000-0000-000000000000'"
        );
        assert_eq!(
            PkValue::String("O'Brien".to_string()).to_sql_literal(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_pk_value_from_sql_value() {
        assert_eq!(
            PkValue::from_sql_value(&SqlValue::I32(7)),
            Some(PkValue::Int(7))
        );
        assert_eq!(
            PkValue::from_sql_value(&SqlValue::Text(Cow::Borrowed("k1"))),
            Some(PkValue::String("k1".to_string()))
        );
        assert_eq!(
            PkValue::from_sql_value(&SqlValue::Decimal(rust_decimal::Decimal::new(120, 0))),
            Some(PkValue::Int(120))
        );
        assert_eq!(PkValue::from_sql_value(&SqlValue::F64(1.5)), None);
    }

    #[test]
    fn test_pk_value_parse_for_type() {
        assert_eq!(PkValue::parse_for_type("25", "BIGINT"), PkValue::Int(25));
        assert_eq!(PkValue::parse_for_type("25", "NUMBER(10,0)"), PkValue::Int(25));
        assert_eq!(
            PkValue::parse_for_type("abc", "VARCHAR(10)"),
            PkValue::String("abc".to_string())
        );
        assert_eq!(
            PkValue::parse_for_type("00000000-0000-0000-0000-000000000000", "UUID"),
            PkValue::Uuid(Uuid::nil())
        );
    }

    #[test]
    fn test_table_pk_shape() {
        let mut table = Table::new("t");
        assert!(!table.has_pk());
        table.primary_key = vec!["a".to_string()];
        assert!(table.has_single_pk());
        table.primary_key.push("b".to_string());
        assert!(table.has_pk());
        assert!(!table.has_single_pk());
    }

    #[test]
    fn test_referenced_tables_ignores_self_reference() {
        let mut table = Table::new("child");
        table.foreign_keys = vec![make_fk("fk_parent", "parent"), make_fk("fk_self", "child")];
        let refs: Vec<&str> = table.referenced_tables().into_iter().collect();
        assert_eq!(refs, vec!["parent"]);
        assert!(table.has_secondary_constraints());
    }

    #[test]
    fn test_column_lookup() {
        let mut table = Table::new("t");
        table.columns = vec![Column::new("id", "integer"), Column::new("name", "text")];
        assert_eq!(table.column_index("name"), Some(1));
        assert!(table.column("missing").is_none());
        assert_eq!(table.column_names(), vec!["id", "name"]);
    }
}
