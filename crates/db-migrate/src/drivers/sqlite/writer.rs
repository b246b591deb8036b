//! SQLite target writer implementation.
//!
//! The pool holds a single connection; SQLite serializes writers anyway.
//! Each chunk is written in one transaction with multi-row INSERTs.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions,
};
use tracing::{debug, info};

use crate::core::schema::{CheckConstraint, ForeignKey, Index, PkValue, Table, UniqueConstraint};
use crate::core::traits::{Dialect, TargetWriter};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::{redact_url, DialectKind};
use crate::error::{MigrateError, Result};

use super::SqliteDialect;

/// Bound variables per statement on older SQLite builds.
const SQLITE_MAX_VARIABLES: usize = 999;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite target writer implementation.
pub struct SqliteWriter {
    pool: SqlitePool,
    dialect: SqliteDialect,
}

impl SqliteWriter {
    /// Open the destination database, creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                MigrateError::Config(format!("Invalid SQLite URL {}: {}", redact_url(url), e))
            })?
            .create_if_missing(true)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "opening SQLite destination"))?;

        info!("Opened SQLite destination: {}", redact_url(url));
        Ok(Self {
            pool,
            dialect: SqliteDialect::new(),
        })
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    fn no_alter(&self, table: &Table, what: &str, name: &str) -> MigrateError {
        MigrateError::Target(format!(
            "SQLite cannot add {} {} to existing table {}",
            what, name, table.name
        ))
    }
}

#[async_trait]
impl TargetWriter for SqliteWriter {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        self.execute(&self.dialect.build_create_table(table)?).await?;
        debug!("Created table {}", table.name);
        Ok(())
    }

    async fn create_unique_constraint(&self, table: &Table, uc: &UniqueConstraint) -> Result<()> {
        Err(self.no_alter(table, "unique constraint", &uc.name))
    }

    async fn create_check_constraint(&self, table: &Table, chk: &CheckConstraint) -> Result<()> {
        Err(self.no_alter(table, "check constraint", &chk.name))
    }

    async fn create_foreign_key(&self, table: &Table, fk: &ForeignKey) -> Result<()> {
        Err(self.no_alter(table, "foreign key", &fk.name))
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
        let max_rows_per_insert = (SQLITE_MAX_VARIABLES / num_cols).max(1);
        let placeholders_per_row = format!("({})", vec!["?"; num_cols].join(", "));

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(max_rows_per_insert) {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                table_name,
                col_list,
                vec![placeholders_per_row.as_str(); chunk.len()].join(", ")
            );

            let mut query = sqlx::query(&sql);
            for value in chunk.iter().flatten() {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await.map_err(|e| {
                MigrateError::transfer(&table.name, format!("INSERT batch: {}", e))
            })?;
        }
        tx.commit().await?;

        debug!("{}: inserted {} rows", table.name, row_count);
        Ok(row_count)
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(&self.dialect.build_count(table)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_max_pk(&self, table: &Table) -> Result<Option<PkValue>> {
        let Some(pk_col) = table.primary_key.first().and_then(|pk| table.column(pk)) else {
            return Ok(None);
        };
        let row: Option<(Option<String>,)> = sqlx::query_as(&self.dialect.build_max_key(table)?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .and_then(|(text,)| text)
            .map(|text| PkValue::parse_for_type(&text, &pk_col.data_type)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bind a value with the closest SQLite storage class.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue<'_>) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::I16(i) => query.bind(i64::from(*i)),
        SqlValue::I32(i) => query.bind(i64::from(*i)),
        SqlValue::I64(i) => query.bind(*i),
        SqlValue::F32(f) => query.bind(f64::from(*f)),
        SqlValue::F64(f) => query.bind(*f),
        SqlValue::Bytes(b) => query.bind(b.to_vec()),
        other => query.bind(other.to_text().map(|s| s.into_owned())),
    }
}
