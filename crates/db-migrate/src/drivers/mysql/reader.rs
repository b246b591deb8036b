//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait for reading data from MySQL/MariaDB databases.
//! Uses SQLx for connection pooling and async query execution.

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Row, ValueRef};
use tracing::{debug, info};

use crate::core::schema::{
    CheckConstraint, Column, ForeignKey, Index, PkValue, Table, UniqueConstraint,
};
use crate::core::traits::{Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::{redact_url, DialectKind};
use crate::error::{MigrateError, Result};

use super::MysqlDialect;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    dialect: MysqlDialect,
}

impl MysqlReader {
    /// Connect to the origin database named in `url`.
    pub async fn connect(url: &str, max_conns: usize) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(url).map_err(|e| {
            MigrateError::Config(format!("Invalid MySQL URL {}: {}", redact_url(url), e))
        })?;

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL origin pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL origin connection"))?;

        info!("Connected to MySQL origin: {}", redact_url(url));

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    /// Load columns for a table.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        // CAST to CHAR/SIGNED to handle collation and unsigned differences.
        // tinyint(1) keeps its full column type so it can be read as a boolean.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(IF(COLUMN_TYPE = 'tinyint(1)', 'tinyint(1)', DATA_TYPE) AS CHAR(255)) AS DATA_TYPE,
                CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
                CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
                CAST(NUMERIC_SCALE AS SIGNED) AS num_scale,
                CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
                CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
                CAST(IF(EXTRA LIKE '%auto_increment%', 1, 0) AS SIGNED) AS is_identity,
                CAST(NULLIF(COLUMN_COMMENT, '') AS CHAR) AS column_comment,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            let numeric = matches!(data_type.as_str(), "decimal" | "numeric");
            table.columns.push(Column {
                name: row.try_get("COLUMN_NAME")?,
                max_length: row
                    .try_get::<Option<i64>, _>("max_length")?
                    .and_then(|v| u32::try_from(v).ok()),
                precision: row
                    .try_get::<Option<i64>, _>("num_precision")?
                    .filter(|_| numeric)
                    .and_then(|v| u32::try_from(v).ok()),
                scale: row
                    .try_get::<Option<i64>, _>("num_scale")?
                    .filter(|_| numeric)
                    .and_then(|v| u32::try_from(v).ok()),
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                default: row.try_get("column_default")?,
                is_autoincrement: row.try_get::<i64, _>("is_identity")? == 1,
                comment: row.try_get("column_comment")?,
                ordinal_pos: row.try_get::<i64, _>("ORDINAL_POSITION")? as i32,
                data_type,
            });
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.name);
        Ok(())
    }

    /// Load primary key columns for a table.
    async fn load_primary_key(&self, table: &mut Table) -> Result<()> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        table.primary_key = rows
            .iter()
            .map(|row| row.try_get("COLUMN_NAME"))
            .collect::<std::result::Result<_, _>>()?;

        debug!("Primary key for {}: {:?}", table.name, table.primary_key);
        Ok(())
    }

    /// Approximate row count from table statistics.
    async fn load_row_count(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED)
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#;

        let row: Option<(i64,)> = sqlx::query_as(query)
            .bind(&table.name)
            .fetch_optional(&self.pool)
            .await?;
        table.row_count = row.map(|(count,)| count).unwrap_or(0);
        Ok(())
    }

    async fn fetch_batch(
        &self,
        table: &Table,
        sql: &str,
        key_idx: Option<usize>,
        limit: usize,
    ) -> Result<Batch> {
        let rows: Vec<MySqlRow> = sqlx::query(sql).fetch_all(&self.pool).await?;
        let values = rows
            .iter()
            .map(|row| row_values(row, &table.columns))
            .collect::<Result<Vec<_>>>()?;
        Ok(Batch::from_rows(values, key_idx, limit))
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    async fn extract_schema(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let mut table = Table::new(name);
            self.load_columns(&mut table).await?;
            self.load_primary_key(&mut table).await?;
            self.load_row_count(&mut table).await?;
            tables.push(table);
        }

        info!("Extracted {} tables from MySQL", tables.len());
        Ok(tables)
    }

    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(tc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND kcu.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = DATABASE()
              AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE = 'UNIQUE'
            ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            pairs.push((
                row.try_get::<String, _>("CONSTRAINT_NAME")?,
                row.try_get::<String, _>("COLUMN_NAME")?,
            ));
        }
        table.unique_constraints = group_columns(pairs)
            .into_iter()
            .map(|(name, columns)| UniqueConstraint { name, columns })
            .collect();

        debug!(
            "Loaded {} unique constraints for {}",
            table.unique_constraints.len(),
            table.name
        );
        Ok(())
    }

    async fn load_check_constraints(&self, table: &mut Table) -> Result<()> {
        // CHECK_CONSTRAINTS needs MySQL 8.0.16+ or MariaDB 10.2+
        let query = r#"
            SELECT
                CAST(cc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(cc.CHECK_CLAUSE AS CHAR) AS CHECK_CLAUSE
            FROM INFORMATION_SCHEMA.CHECK_CONSTRAINTS cc
            JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                ON tc.CONSTRAINT_SCHEMA = cc.CONSTRAINT_SCHEMA
                AND tc.CONSTRAINT_NAME = cc.CONSTRAINT_NAME
            WHERE tc.TABLE_SCHEMA = DATABASE()
              AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE = 'CHECK'
            ORDER BY cc.CONSTRAINT_NAME
        "#;

        let rows: Vec<MySqlRow> = match sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                debug!("Check constraints unavailable for {}: {}", table.name, e);
                return Ok(());
            }
        };

        for row in rows {
            table.check_constraints.push(CheckConstraint {
                name: row.try_get("CONSTRAINT_NAME")?,
                definition: row.try_get("CHECK_CLAUSE")?,
            });
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
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.DELETE_RULE AS CHAR(32)) AS DELETE_RULE,
                CAST(rc.UPDATE_RULE AS CHAR(32)) AS UPDATE_RULE
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
            WHERE kcu.TABLE_SCHEMA = DATABASE()
              AND kcu.TABLE_NAME = ?
              AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let name: String = row.try_get("CONSTRAINT_NAME")?;
            let column: String = row.try_get("COLUMN_NAME")?;
            let ref_column: String = row.try_get("REFERENCED_COLUMN_NAME")?;

            match table.foreign_keys.iter_mut().find(|fk| fk.name == name) {
                Some(fk) => {
                    fk.columns.push(column);
                    fk.ref_columns.push(ref_column);
                }
                None => table.foreign_keys.push(ForeignKey {
                    name,
                    columns: vec![column],
                    ref_table: row.try_get("REFERENCED_TABLE_NAME")?,
                    ref_columns: vec![ref_column],
                    on_delete: referential_action(row.try_get("DELETE_RULE")?),
                    on_update: referential_action(row.try_get("UPDATE_RULE")?),
                }),
            }
        }

        debug!(
            "Loaded {} foreign keys for {}",
            table.foreign_keys.len(),
            table.name
        );
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        // Functional indexes have no COLUMN_NAME and are left out
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(IF(NON_UNIQUE = 0, 1, 0) AS SIGNED) AS is_unique
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
              AND TABLE_NAME = ?
              AND INDEX_NAME <> 'PRIMARY'
              AND COLUMN_NAME IS NOT NULL
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let name: String = row.try_get("INDEX_NAME")?;
            let column: String = row.try_get("COLUMN_NAME")?;
            match table.indexes.iter_mut().find(|idx| idx.name == name) {
                Some(idx) => idx.columns.push(column),
                None => table.indexes.push(Index {
                    name,
                    columns: vec![column],
                    is_unique: row.try_get::<i64, _>("is_unique")? == 1,
                }),
            }
        }

        debug!("Loaded {} indexes for {}", table.indexes.len(), table.name);
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query).fetch_all(&self.pool).await?;
        let names = rows
            .iter()
            .map(|row| row.try_get("TABLE_NAME"))
            .collect::<std::result::Result<_, _>>()?;
        Ok(names)
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
        self.fetch_batch(table, &sql, key_idx, limit).await
    }

    async fn read_at_offset(&self, table: &Table, offset: i64, limit: usize) -> Result<Batch> {
        let sql = self.dialect.build_offset_select(table, offset, limit)?;
        self.fetch_batch(table, &sql, None, limit).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Fold ordered `(name, column)` rows into one entry per name.
fn group_columns(pairs: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, column) in pairs {
        match grouped.last_mut() {
            Some((last, columns)) if *last == name => columns.push(column),
            _ => grouped.push((name, vec![column])),
        }
    }
    grouped
}

/// `NO ACTION` is the default and is not repeated in DDL.
fn referential_action(rule: Option<String>) -> Option<String> {
    rule.filter(|r| !r.eq_ignore_ascii_case("NO ACTION"))
}

fn row_values(row: &MySqlRow, columns: &[Column]) -> Result<Vec<SqlValue<'static>>> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| column_value(row, idx, col))
        .collect()
}

/// Decode one value by the origin column type.
fn column_value(row: &MySqlRow, idx: usize, col: &Column) -> Result<SqlValue<'static>> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match col.data_type.to_lowercase().as_str() {
        "tinyint(1)" => match integer_value(row, idx)? {
            SqlValue::I64(v) => SqlValue::Bool(v != 0),
            other => other,
        },
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "bit" | "year" => {
            integer_value(row, idx)?
        }
        "float" => SqlValue::F32(row.try_get(idx)?),
        "double" | "real" => SqlValue::F64(row.try_get(idx)?),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            SqlValue::Bytes(Cow::Owned(row.try_get::<Vec<u8>, _>(idx)?))
        }
        // zero dates cannot be represented and read as NULL
        "date" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        "datetime" | "timestamp" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        _ => SqlValue::Text(Cow::Owned(row.try_get::<String, _>(idx)?)),
    };
    Ok(value)
}

fn integer_value(row: &MySqlRow, idx: usize) -> Result<SqlValue<'static>> {
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(SqlValue::I64(v));
    }
    let v: u64 = row.try_get(idx)?;
    Ok(match i64::try_from(v) {
        Ok(v) => SqlValue::I64(v),
        Err(_) => SqlValue::Text(Cow::Owned(v.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_columns_keeps_order() {
        let grouped = group_columns(vec![
            ("uq_a".to_string(), "x".to_string()),
            ("uq_a".to_string(), "y".to_string()),
            ("uq_b".to_string(), "z".to_string()),
        ]);
        assert_eq!(
            grouped,
            vec![
                ("uq_a".to_string(), vec!["x".to_string(), "y".to_string()]),
                ("uq_b".to_string(), vec!["z".to_string()]),
            ]
        );
    }

    #[test]
    fn test_referential_action() {
        assert_eq!(referential_action(Some("NO ACTION".into())), None);
        assert_eq!(
            referential_action(Some("CASCADE".into())),
            Some("CASCADE".to_string())
        );
        assert_eq!(referential_action(None), None);
    }
}
