//! MySQL/MariaDB target writer implementation.
//!
//! Implements the `TargetWriter` trait for writing data to MySQL/MariaDB databases.
//! Uses mysql_async for connection pooling; rows go in as multi-row INSERTs
//! inside one transaction per chunk.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, TxOpts, Value};
use tracing::{debug, info, warn};

use crate::core::schema::{CheckConstraint, ForeignKey, Index, PkValue, Table, UniqueConstraint};
use crate::core::traits::{Dialect, TargetWriter};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::{redact_url, DialectKind};
use crate::error::{MigrateError, Result};

use super::MysqlDialect;

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL/MariaDB target writer implementation.
pub struct MysqlWriter {
    pool: Pool,
    dialect: MysqlDialect,
}

impl MysqlWriter {
    /// Connect to the destination database named in `url`.
    pub async fn connect(url: &str, max_conns: usize) -> Result<Self> {
        let opts = Opts::from_url(url).map_err(|e| {
            MigrateError::Config(format!("Invalid MySQL URL {}: {}", redact_url(url), e))
        })?;

        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            MigrateError::Config(format!("Invalid MySQL pool size: {}", max_conns))
        })?;
        let builder = OptsBuilder::from_opts(opts)
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(PoolOpts::new().with_constraints(constraints));
        let pool = Pool::new(builder);

        let writer = Self {
            pool,
            dialect: MysqlDialect::new(),
        };
        writer.test_connection().await?;

        info!("Connected to MySQL destination: {}", redact_url(url));
        Ok(writer)
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.conn("testing MySQL destination connection").await?;
        conn.query_drop("SELECT 1").await?;
        Ok(())
    }

    async fn conn(&self, context: &str) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, context.to_string()))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.conn("executing MySQL DDL").await?;
        conn.query_drop(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let mut conn = self.conn("listing MySQL tables").await?;
        let names: Vec<String> = conn
            .query(
                "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
            )
            .await?;
        Ok(names)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.conn("checking MySQL table").await?;
        let sql = r#"
            SELECT COUNT(*)
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#;
        let count: Option<i64> = conn.exec_first(sql, (table,)).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        let ddl = format!(
            "{} ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.dialect.build_create_table(table)?
        );
        self.execute(&ddl).await?;
        debug!("Created table {}", table.name);
        Ok(())
    }

    async fn create_unique_constraint(&self, table: &Table, uc: &UniqueConstraint) -> Result<()> {
        self.execute(&self.dialect.build_add_unique(&table.name, uc)?)
            .await?;
        debug!("Created unique constraint {} on {}", uc.name, table.name);
        Ok(())
    }

    async fn create_check_constraint(&self, table: &Table, chk: &CheckConstraint) -> Result<()> {
        self.execute(&self.dialect.build_add_check(&table.name, chk)?)
            .await?;
        debug!("Created check constraint {} on {}", chk.name, table.name);
        Ok(())
    }

    async fn create_foreign_key(&self, table: &Table, fk: &ForeignKey) -> Result<()> {
        self.execute(&self.dialect.build_add_foreign_key(&table.name, fk)?)
            .await?;
        debug!("Created foreign key {} on {}", fk.name, table.name);
        Ok(())
    }

    async fn create_index(&self, table: &Table, idx: &Index) -> Result<()> {
        self.execute(&self.dialect.build_create_index(&table.name, idx)?)
            .await?;
        debug!("Created index {} on {}", idx.name, table.name);
        Ok(())
    }

    async fn write_batch(&self, table: &Table, batch: Batch) -> Result<u64> {
        let rows = batch.rows;
        let num_cols = table.columns.len();
        if rows.is_empty() || num_cols == 0 {
            return Ok(0);
        }

        let row_count = rows.len() as u64;
        let table_name = self.dialect.quote_ident(&table.name)?;
        let col_list = self.dialect.quote_list(&table.column_names())?;
        let max_rows_per_insert = (MYSQL_MAX_PLACEHOLDERS / num_cols).max(1);
        let placeholders_per_row = format!("({})", vec!["?"; num_cols].join(", "));

        let mut conn = self.conn("writing MySQL batch").await?;
        let mut tx = conn.start_transaction(TxOpts::default()).await?;

        for chunk in rows.chunks(max_rows_per_insert) {
            let all_placeholders = vec![placeholders_per_row.as_str(); chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                table_name, col_list, all_placeholders
            );

            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            tx.exec_drop(&sql, params).await.map_err(|e| {
                MigrateError::transfer(&table.name, format!("INSERT batch: {}", e))
            })?;
        }

        tx.commit().await?;

        debug!("{}: inserted {} rows", table.name, row_count);
        Ok(row_count)
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn("counting MySQL rows").await?;
        let sql = self.dialect.build_count(table)?;
        let count: Option<i64> = conn.query_first(sql.as_str()).await?;
        Ok(count.unwrap_or(0))
    }

    async fn get_max_pk(&self, table: &Table) -> Result<Option<PkValue>> {
        let Some(pk_col) = table.primary_key.first().and_then(|pk| table.column(pk)) else {
            return Ok(None);
        };
        let mut conn = self.conn("reading MySQL max key").await?;
        let sql = self.dialect.build_max_key(table)?;
        let max: Option<Option<String>> = conn.query_first(sql.as_str()).await?;
        Ok(max
            .flatten()
            .map(|text| PkValue::parse_for_type(&text, &pk_col.data_type)))
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error closing MySQL pool: {}", e);
        }
    }
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.to_vec()),
        SqlValue::Uuid(u) => Value::from(u.to_string()),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::DateTime(dt) => datetime_value(dt),
        SqlValue::DateTimeOffset(dto) => datetime_value(&dto.naive_utc()),
        SqlValue::Date(d) => datetime_value(&d.and_time(chrono::NaiveTime::MIN)),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}

fn datetime_value(dt: &chrono::NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use std::borrow::Cow;

    #[test]
    fn test_sql_value_to_mysql_scalars() {
        assert_eq!(sql_value_to_mysql(&SqlValue::Null), Value::NULL);
        assert_eq!(sql_value_to_mysql(&SqlValue::I32(7)), Value::Int(7));
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Text(Cow::Borrowed("abc"))),
            Value::Bytes(b"abc".to_vec())
        );
    }

    #[test]
    fn test_sql_value_to_mysql_temporal() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(13, 5, 7, 250)
            .unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::DateTime(dt)),
            Value::Date(2024, 3, 9, 13, 5, 7, 250)
        );

        let t = NaiveTime::from_hms_opt(23, 59, 1).unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Time(t)),
            Value::Time(false, 0, 23, 59, 1, 0)
        );
    }
}
