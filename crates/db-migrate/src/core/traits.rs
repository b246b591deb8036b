//! Core traits for database-agnostic data migration.
//!
//! This module defines the primary abstractions used by the migration engine:
//!
//! - [`SourceReader`]: Reads schema and data from origin databases
//! - [`TargetWriter`]: Writes schema and data to destination databases
//! - [`Dialect`]: SQL syntax strategy for different database engines
//! - [`TypeMapper`]: Maps types between origin and destination dialects
//!
//! # Design Patterns
//!
//! - **Abstract Factory**: The catalog connects a reader/writer family per URL
//! - **Strategy**: Dialect and TypeMapper provide interchangeable algorithms
//! - **Template Method**: Default implementations in traits define algorithm skeletons

use async_trait::async_trait;

use crate::dialect::DialectKind;
use crate::error::{MigrateError, Result};

use super::identifier::validate_check_constraint;
use super::schema::{CheckConstraint, Column, ForeignKey, Index, PkValue, Table, UniqueConstraint};
use super::value::Batch;

/// Read schema and data from an origin database.
///
/// Row reads come in two shapes: keyset pages (`pk > cursor`) for tables
/// with a single-column primary key, and offset pages ordered by the full
/// key for composite keys.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// The dialect of the connected database.
    fn kind(&self) -> DialectKind;

    /// Extract table metadata from the origin.
    ///
    /// Returns every user table with columns, primary key and row count but
    /// without constraint/index metadata (use [`load_table_metadata`] for that).
    ///
    /// [`load_table_metadata`]: SourceReader::load_table_metadata
    async fn extract_schema(&self) -> Result<Vec<Table>>;

    /// Load constraint and index metadata for a table.
    ///
    /// This is a template method with a default implementation that calls
    /// the individual metadata loading methods.
    async fn load_table_metadata(&self, table: &mut Table) -> Result<()> {
        self.load_unique_constraints(table).await?;
        self.load_check_constraints(table).await?;
        self.load_foreign_keys(table).await?;
        self.load_indexes(table).await?;
        Ok(())
    }

    /// Load unique constraint metadata for a table.
    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()>;

    /// Load check constraint metadata for a table.
    async fn load_check_constraints(&self, table: &mut Table) -> Result<()>;

    /// Load foreign key metadata for a table.
    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()>;

    /// Load non-primary-key index metadata for a table.
    async fn load_indexes(&self, table: &mut Table) -> Result<()>;

    /// Names of all user tables.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Get the row count for a table.
    async fn get_row_count(&self, table: &str) -> Result<i64>;

    /// Read up to `limit` rows with key greater than `after`, ordered by key.
    ///
    /// `after = None` reads from the start of the table.
    async fn read_after_key(
        &self,
        table: &Table,
        after: Option<&PkValue>,
        limit: usize,
    ) -> Result<Batch>;

    /// Read up to `limit` rows starting at `offset`, ordered by every
    /// primary key column.
    async fn read_at_offset(&self, table: &Table, offset: i64, limit: usize) -> Result<Batch>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write schema and data to a destination database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// The dialect of the connected database.
    fn kind(&self) -> DialectKind;

    // ===== Schema Operations =====

    /// Names of all user tables.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create a table with whatever constraints the descriptor carries inline.
    async fn create_table(&self, table: &Table) -> Result<()>;

    // ===== Constraint Operations =====

    /// Add a unique constraint to an existing table.
    async fn create_unique_constraint(&self, table: &Table, uc: &UniqueConstraint) -> Result<()>;

    /// Add a check constraint to an existing table.
    async fn create_check_constraint(&self, table: &Table, chk: &CheckConstraint) -> Result<()>;

    /// Add a foreign key constraint to an existing table.
    async fn create_foreign_key(&self, table: &Table, fk: &ForeignKey) -> Result<()>;

    /// Create an index on a table.
    async fn create_index(&self, table: &Table, idx: &Index) -> Result<()>;

    // ===== Data Operations =====

    /// Insert a batch of rows in one transaction. Returns rows written.
    async fn write_batch(&self, table: &Table, batch: Batch) -> Result<u64>;

    /// Get the row count for a table.
    async fn get_row_count(&self, table: &str) -> Result<i64>;

    /// Largest primary key value present, for single-column keys.
    async fn get_max_pk(&self, table: &Table) -> Result<Option<PkValue>>;

    // ===== Capabilities =====

    /// Whether constraints can be added after the table is populated.
    fn supports_post_hoc_constraints(&self) -> bool {
        self.kind().supports_post_hoc_constraints()
    }

    /// Upper bound on concurrent writers, if the engine has one.
    fn max_concurrent_writers(&self) -> Option<usize> {
        self.kind().max_concurrent_writers()
    }

    /// Close the connection pool.
    async fn close(&self);
}

/// SQL syntax strategy for different database engines.
///
/// Only [`kind`](Dialect::kind) and [`quote_ident`](Dialect::quote_ident) are
/// required; the statement builders default to ANSI forms with
/// `LIMIT ... OFFSET ...` paging, which every supported driver accepts.
pub trait Dialect: Send + Sync {
    /// The dialect this strategy renders.
    fn kind(&self) -> DialectKind;

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - PostgreSQL/SQLite: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Type used to read a key back as text.
    fn text_cast_type(&self) -> &'static str {
        "TEXT"
    }

    /// Comma-separated quoted identifiers.
    fn quote_list(&self, names: &[String]) -> Result<String> {
        let quoted = names
            .iter()
            .map(|n| self.quote_ident(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// `table.column`. Filters and sort keys use this form so they never
    /// bind to a same-named select alias.
    fn qualified_column(&self, table: &str, column: &str) -> Result<String> {
        Ok(format!("{}.{}", self.quote_ident(table)?, self.quote_ident(column)?))
    }

    /// Expression selecting a column for a row read.
    fn select_column(&self, col: &Column) -> Result<String> {
        self.quote_ident(&col.name)
    }

    /// Select list for a row read, in table column order.
    fn select_list(&self, table: &Table) -> Result<String> {
        let exprs = table
            .columns
            .iter()
            .map(|c| self.select_column(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(exprs.join(", "))
    }

    /// Column definition inside CREATE TABLE.
    fn column_definition(&self, col: &Column) -> Result<String> {
        let null_clause = if col.is_nullable { "" } else { " NOT NULL" };
        Ok(format!(
            "{} {}{}",
            self.quote_ident(&col.name)?,
            col.data_type,
            null_clause
        ))
    }

    /// `CONSTRAINT name UNIQUE (cols)`.
    fn unique_clause(&self, uc: &UniqueConstraint) -> Result<String> {
        Ok(format!(
            "CONSTRAINT {} UNIQUE ({})",
            self.quote_ident(&uc.name)?,
            self.quote_list(&uc.columns)?
        ))
    }

    /// `CONSTRAINT name CHECK (expr)`. Rejects suspicious expressions.
    fn check_clause(&self, chk: &CheckConstraint) -> Result<String> {
        validate_check_constraint(&chk.definition)?;
        Ok(format!(
            "CONSTRAINT {} CHECK ({})",
            self.quote_ident(&chk.name)?,
            chk.definition
        ))
    }

    /// `CONSTRAINT name FOREIGN KEY (cols) REFERENCES t (cols) ...`.
    fn foreign_key_clause(&self, fk: &ForeignKey) -> Result<String> {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_ident(&fk.name)?,
            self.quote_list(&fk.columns)?,
            self.quote_ident(&fk.ref_table)?,
            self.quote_list(&fk.ref_columns)?
        );
        if let Some(action) = &fk.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action));
        }
        if let Some(action) = &fk.on_update {
            sql.push_str(&format!(" ON UPDATE {}", action));
        }
        Ok(sql)
    }

    /// CREATE TABLE with the primary key and every constraint in the
    /// descriptor rendered inline.
    fn build_create_table(&self, table: &Table) -> Result<String> {
        let mut parts = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;
        if table.has_pk() {
            parts.push(format!("PRIMARY KEY ({})", self.quote_list(&table.primary_key)?));
        }
        for uc in &table.unique_constraints {
            parts.push(self.unique_clause(uc)?);
        }
        for chk in &table.check_constraints {
            parts.push(self.check_clause(chk)?);
        }
        for fk in &table.foreign_keys {
            parts.push(self.foreign_key_clause(fk)?);
        }
        Ok(format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(&table.name)?,
            parts.join(",\n    ")
        ))
    }

    /// Keyset page: rows with key above `after`, ordered by key.
    fn build_keyset_select(
        &self,
        table: &Table,
        after: Option<&PkValue>,
        limit: usize,
    ) -> Result<String> {
        let pk_quoted = self.qualified_column(&table.name, single_pk(table)?)?;
        let filter = match after {
            Some(key) => format!(" WHERE {} > {}", pk_quoted, key.to_sql_literal()),
            None => String::new(),
        };
        Ok(format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT {}",
            self.select_list(table)?,
            self.quote_ident(&table.name)?,
            filter,
            pk_quoted,
            limit
        ))
    }

    /// Offset page ordered by the full primary key.
    fn build_offset_select(&self, table: &Table, offset: i64, limit: usize) -> Result<String> {
        if !table.has_pk() {
            return Err(MigrateError::transfer(
                &table.name,
                "offset reads need a primary key to order by",
            ));
        }
        Ok(format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            self.select_list(table)?,
            self.quote_ident(&table.name)?,
            table
                .primary_key
                .iter()
                .map(|c| self.qualified_column(&table.name, c))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
            limit,
            offset
        ))
    }

    /// `SELECT COUNT(*) FROM t`.
    fn build_count(&self, table: &str) -> Result<String> {
        Ok(format!("SELECT COUNT(*) FROM {}", self.quote_ident(table)?))
    }

    /// Largest key rendered as text, so every driver reads one type back.
    fn build_max_key(&self, table: &Table) -> Result<String> {
        let pk = self.qualified_column(&table.name, single_pk(table)?)?;
        Ok(format!(
            "SELECT CAST({pk} AS {}) FROM {} ORDER BY {pk} DESC LIMIT 1",
            self.text_cast_type(),
            self.quote_ident(&table.name)?,
        ))
    }

    /// `ALTER TABLE t ADD CONSTRAINT ... UNIQUE`.
    fn build_add_unique(&self, table: &str, uc: &UniqueConstraint) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_ident(table)?,
            self.unique_clause(uc)?
        ))
    }

    /// `ALTER TABLE t ADD CONSTRAINT ... CHECK`.
    fn build_add_check(&self, table: &str, chk: &CheckConstraint) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_ident(table)?,
            self.check_clause(chk)?
        ))
    }

    /// `ALTER TABLE t ADD CONSTRAINT ... FOREIGN KEY`.
    fn build_add_foreign_key(&self, table: &str, fk: &ForeignKey) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_ident(table)?,
            self.foreign_key_clause(fk)?
        ))
    }

    /// `CREATE [UNIQUE] INDEX name ON t (cols)`.
    fn build_create_index(&self, table: &str, idx: &Index) -> Result<String> {
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if idx.is_unique { "UNIQUE " } else { "" },
            self.quote_ident(&idx.name)?,
            self.quote_ident(table)?,
            self.quote_list(&idx.columns)?
        ))
    }
}

fn single_pk(table: &Table) -> Result<&str> {
    match table.primary_key.as_slice() {
        [pk] => Ok(pk.as_str()),
        _ => Err(MigrateError::transfer(
            &table.name,
            "keyset reads need a single-column primary key",
        )),
    }
}

/// Maps data types between origin and destination dialects.
///
/// Mappers are registered per (origin, destination) pair in the catalog; a
/// missing pair is a configuration error.
pub trait TypeMapper: Send + Sync {
    /// The origin dialect.
    fn source_dialect(&self) -> DialectKind;

    /// The destination dialect.
    fn target_dialect(&self) -> DialectKind;

    /// Map a column definition from origin to destination.
    ///
    /// Returns a [`ColumnMapping`] with the destination type string and
    /// any warnings about lossy conversions.
    fn map_column(&self, col: &Column) -> ColumnMapping;

    /// Map an origin type to a destination type expression.
    ///
    /// Lower-level method used by `map_column`.
    fn map_type(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> TypeMapping;
}

/// Result of mapping a column from origin to destination.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    /// Column name.
    pub name: String,
    /// Destination data type string.
    pub target_type: String,
    /// Whether the column is nullable.
    pub is_nullable: bool,
    /// Warning message if the mapping is lossy.
    pub warning: Option<String>,
}

/// Result of mapping a type from origin to destination.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    /// Destination type string (e.g., "VARCHAR(255)", "BIGINT").
    pub target_type: String,
    /// Whether this mapping loses data or precision.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}
