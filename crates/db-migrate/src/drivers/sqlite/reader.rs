//! SQLite source reader implementation.
//!
//! Metadata comes from `sqlite_master` and the table-valued PRAGMA functions.
//! CHECK constraints are not exposed by any PRAGMA and are parsed from the
//! stored CREATE TABLE text.

use std::borrow::Cow;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::core::schema::{
    CheckConstraint, Column, ForeignKey, Index, PkValue, Table, UniqueConstraint,
};
use crate::core::traits::{Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::{redact_url, DialectKind};
use crate::error::{MigrateError, Result};

use super::{database_path, SqliteDialect};

/// Smallest file that can hold a SQLite header.
const MIN_DATABASE_FILE_SIZE: u64 = 100;

/// SQLite source reader implementation.
pub struct SqliteReader {
    pool: SqlitePool,
    dialect: SqliteDialect,
}

impl SqliteReader {
    /// Open the origin database. The file must already exist.
    pub async fn connect(url: &str, max_conns: usize) -> Result<Self> {
        if let Some(path) = database_path(url) {
            check_database_file(path).await?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                MigrateError::Config(format!("Invalid SQLite URL {}: {}", redact_url(url), e))
            })?
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "opening SQLite origin"))?;

        info!("Opened SQLite origin: {}", redact_url(url));
        Ok(Self {
            pool,
            dialect: SqliteDialect::new(),
        })
    }

    /// Load columns and primary key for a table.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT cid, name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
        "#;

        let rows: Vec<SqliteRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut pk: Vec<(i64, String)> = Vec::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            let pk_pos: i64 = row.try_get("pk")?;
            let (data_type, max_length, precision, scale) = parse_declared_type(&declared);

            if pk_pos > 0 {
                pk.push((pk_pos, name.clone()));
            }
            table.columns.push(Column {
                name,
                data_type,
                max_length,
                precision,
                scale,
                is_nullable: row.try_get::<i64, _>("notnull")? == 0 && pk_pos == 0,
                default: row.try_get("dflt_value")?,
                is_autoincrement: false,
                comment: None,
                ordinal_pos: row.try_get::<i64, _>("cid")? as i32 + 1,
            });
        }

        pk.sort_by_key(|(pos, _)| *pos);
        table.primary_key = pk.into_iter().map(|(_, name)| name).collect();

        // INTEGER PRIMARY KEY aliases the rowid
        if let [pk_name] = table.primary_key.as_slice() {
            if let Some(col) = table.columns.iter_mut().find(|c| &c.name == pk_name) {
                col.is_autoincrement = col.data_type == "integer";
            }
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.name);
        Ok(())
    }

    async fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(sql,)| sql))
    }

    /// Indexes of the table created with the given origin (`u` or `c`).
    async fn index_list(&self, table: &str, origin: &str) -> Result<Vec<(String, bool)>> {
        let query = r#"
            SELECT name, "unique"
            FROM pragma_index_list(?)
            WHERE origin = ? AND partial = 0
            ORDER BY name
        "#;
        let rows: Vec<SqliteRow> = sqlx::query(query)
            .bind(table)
            .bind(origin)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, bool)> {
                Ok((row.try_get("name")?, row.try_get::<i64, _>("unique")? == 1))
            })
            .collect()
    }

    /// Indexed columns in key order; `None` when any part is an expression.
    async fn index_columns(&self, index: &str) -> Result<Option<Vec<String>>> {
        let rows: Vec<SqliteRow> =
            sqlx::query("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                .bind(index)
                .fetch_all(&self.pool)
                .await?;

        let columns = rows
            .iter()
            .map(|row| row.try_get::<Option<String>, _>("name"))
            .collect::<std::result::Result<Option<Vec<_>>, _>>()?;
        Ok(columns)
    }

    async fn fetch_batch(&self, sql: &str, key_idx: Option<usize>, limit: usize) -> Result<Batch> {
        let rows: Vec<SqliteRow> = sqlx::query(sql).fetch_all(&self.pool).await?;
        let values = rows.iter().map(row_values).collect::<Result<Vec<_>>>()?;
        Ok(Batch::from_rows(values, key_idx, limit))
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    async fn extract_schema(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let mut table = Table::new(name);
            self.load_columns(&mut table).await?;
            table.row_count = self.get_row_count(&table.name).await?;
            tables.push(table);
        }

        info!("Extracted {} tables from SQLite", tables.len());
        Ok(tables)
    }

    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()> {
        for (index, _) in self.index_list(&table.name, "u").await? {
            if let Some(columns) = self.index_columns(&index).await? {
                table.unique_constraints.push(UniqueConstraint {
                    name: format!("uq_{}_{}", table.name, columns.join("_")),
                    columns,
                });
            }
        }

        debug!(
            "Loaded {} unique constraints for {}",
            table.unique_constraints.len(),
            table.name
        );
        Ok(())
    }

    async fn load_check_constraints(&self, table: &mut Table) -> Result<()> {
        if let Some(sql) = self.table_sql(&table.name).await? {
            table.check_constraints = parse_check_constraints(&table.name, &sql);
        }

        debug!(
            "Loaded {} check constraints for {}",
            table.check_constraints.len(),
            table.name
        );
        Ok(())
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT id, "table", "from", "to", on_update, on_delete
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
        "#;
        let rows: Vec<SqliteRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut fks: Vec<(i64, ForeignKey, bool)> = Vec::new();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let column: String = row.try_get("from")?;
            let ref_column: Option<String> = row.try_get("to")?;
            let implicit = ref_column.is_none();

            match fks.iter_mut().find(|(fk_id, _, _)| *fk_id == id) {
                Some((_, fk, _)) => {
                    fk.columns.push(column);
                    fk.ref_columns.extend(ref_column);
                }
                None => fks.push((
                    id,
                    ForeignKey {
                        name: format!("fk_{}_{}", table.name, id),
                        columns: vec![column],
                        ref_table: row.try_get("table")?,
                        ref_columns: ref_column.into_iter().collect(),
                        on_delete: referential_action(row.try_get("on_delete")?),
                        on_update: referential_action(row.try_get("on_update")?),
                    },
                    implicit,
                )),
            }
        }

        for (_, mut fk, implicit) in fks {
            // REFERENCES t without columns points at t's primary key
            if implicit {
                let mut referenced = Table::new(fk.ref_table.clone());
                self.load_columns(&mut referenced).await?;
                fk.ref_columns = referenced.primary_key;
            }
            table.foreign_keys.push(fk);
        }

        debug!(
            "Loaded {} foreign keys for {}",
            table.foreign_keys.len(),
            table.name
        );
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        for (name, is_unique) in self.index_list(&table.name, "c").await? {
            if let Some(columns) = self.index_columns(&name).await? {
                table.indexes.push(Index {
                    name,
                    columns,
                    is_unique,
                });
            }
        }

        debug!("Loaded {} indexes for {}", table.indexes.len(), table.name);
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(&self.dialect.build_count(table)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn read_after_key(
        &self,
        table: &Table,
        after: Option<&PkValue>,
        limit: usize,
    ) -> Result<Batch> {
        let sql = self.dialect.build_keyset_select(table, after, limit)?;
        let key_idx = table
            .primary_key
            .first()
            .and_then(|pk| table.column_index(pk));
        self.fetch_batch(&sql, key_idx, limit).await
    }

    async fn read_at_offset(&self, table: &Table, offset: i64, limit: usize) -> Result<Batch> {
        let sql = self.dialect.build_offset_select(table, offset, limit)?;
        self.fetch_batch(&sql, None, limit).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn check_database_file(path: &str) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        MigrateError::Config(format!("Origin database file {} is not readable: {}", path, e))
    })?;
    if metadata.len() < MIN_DATABASE_FILE_SIZE {
        return Err(MigrateError::Config(format!(
            "Origin database file {} is too small to be a SQLite database ({} bytes)",
            path,
            metadata.len()
        )));
    }
    Ok(())
}

/// Split a declared type like `NUMERIC(10, 2)` into its lowercase base name
/// and length/precision/scale.
fn parse_declared_type(declared: &str) -> (String, Option<u32>, Option<u32>, Option<u32>) {
    let (base, args) = match declared.split_once('(') {
        Some((base, rest)) => (base, rest.trim_end().trim_end_matches(')')),
        None => (declared, ""),
    };
    let base = base.trim().to_lowercase();
    let nums: Vec<u32> = args
        .split(',')
        .filter_map(|n| n.trim().parse().ok())
        .collect();

    let is_numeric = matches!(base.as_str(), "numeric" | "decimal");
    match (is_numeric, nums.as_slice()) {
        (true, [p]) => (base, None, Some(*p), Some(0)),
        (true, [p, s, ..]) => (base, None, Some(*p), Some(*s)),
        (false, [len, ..]) => (base, Some(*len), None, None),
        _ => (base, None, None, None),
    }
}

/// `NO ACTION` is the default and is not repeated in DDL.
fn referential_action(action: Option<String>) -> Option<String> {
    action.filter(|a| !a.eq_ignore_ascii_case("NO ACTION"))
}

/// Extract CHECK constraints from a CREATE TABLE statement.
///
/// Named checks keep their `CONSTRAINT name`; unnamed ones are numbered
/// `ck_{table}_{n}` in order of appearance.
fn parse_check_constraints(table: &str, create_sql: &str) -> Vec<CheckConstraint> {
    let bytes = create_sql.as_bytes();
    let mut checks = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if matches!(b, b'\'' | b'"' | b'`') {
            quote = Some(b);
            i += 1;
            continue;
        }
        if !is_check_keyword(bytes, i) {
            i += 1;
            continue;
        }

        let after = create_sql[i + 5..].trim_start();
        if !after.starts_with('(') {
            i += 5;
            continue;
        }
        let open = create_sql.len() - after.len();
        let Some(close) = matching_paren(create_sql, open) else {
            break;
        };
        let definition = create_sql[open + 1..close].trim().to_string();
        let name = constraint_name_before(&create_sql[..i])
            .unwrap_or_else(|| format!("ck_{}_{}", table, checks.len() + 1));
        checks.push(CheckConstraint { name, definition });
        i = close + 1;
    }

    checks
}

/// Whether a standalone `CHECK` word starts at `i`.
fn is_check_keyword(bytes: &[u8], i: usize) -> bool {
    let Some(word) = bytes.get(i..i + 5) else {
        return false;
    };
    word.eq_ignore_ascii_case(b"CHECK")
        && (i == 0 || !is_ident_byte(bytes[i - 1]))
        && bytes.get(i + 5).map_or(true, |b| !is_ident_byte(*b))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Position of the `)` closing the `(` at `open`, skipping quoted text.
fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql[open..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Name from a trailing `CONSTRAINT name` in `prefix`.
fn constraint_name_before(prefix: &str) -> Option<String> {
    let mut tokens = prefix.split_whitespace().rev();
    let name = tokens.next()?;
    let keyword = tokens.next()?;
    if !keyword.eq_ignore_ascii_case("CONSTRAINT") {
        return None;
    }
    let name = name
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .to_string();
    (!name.is_empty()).then_some(name)
}

fn row_values(row: &SqliteRow) -> Result<Vec<SqlValue<'static>>> {
    (0..row.len()).map(|idx| column_value(row, idx)).collect()
}

/// Decode by the storage class of the stored value, not the declared type.
fn column_value(row: &SqliteRow, idx: usize) -> Result<SqlValue<'static>> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => SqlValue::I64(row.try_get(idx)?),
        "REAL" => SqlValue::F64(row.try_get(idx)?),
        "BLOB" => SqlValue::Bytes(Cow::Owned(row.try_get::<Vec<u8>, _>(idx)?)),
        _ => SqlValue::Text(Cow::Owned(row.try_get::<String, _>(idx)?)),
    };
    Ok(value)
}
