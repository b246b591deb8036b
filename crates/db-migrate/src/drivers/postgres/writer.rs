//! PostgreSQL target writer implementation.
//!
//! Rows are loaded with `COPY ... FROM STDIN` in text format, one COPY per
//! chunk. A COPY is atomic, so a failed chunk leaves nothing behind.

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Object, Pool};
use futures::SinkExt;
use tracing::debug;

use crate::core::schema::{CheckConstraint, ForeignKey, Index, PkValue, Table, UniqueConstraint};
use crate::core::traits::{Dialect, TargetWriter};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::DialectKind;
use crate::error::{MigrateError, Result};

use super::{connect_pool, PostgresDialect};

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresWriter {
    /// Connect to the destination database.
    pub async fn connect(url: &str, max_conns: usize) -> Result<Self> {
        let pool = connect_pool(url, max_conns, "destination").await?;
        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' AND table_schema = current_schema()",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client().await?;
        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
        "#;
        let row = client.query_one(sql, &[&table]).await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        let ddl = self.dialect.build_create_table(table)?;
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
        if rows.is_empty() {
            return Ok(0);
        }
        let row_count = rows.len() as u64;

        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            self.dialect.quote_ident(&table.name)?,
            self.dialect.quote_list(&table.column_names())?
        );

        let mut text_buf = String::with_capacity(rows.len() * 128);
        for row in &rows {
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    text_buf.push('\t');
                }
                text_buf.push_str(&copy_text(value));
            }
            text_buf.push('\n');
        }

        let client = self.client().await?;
        let sink = client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| MigrateError::transfer(&table.name, format!("COPY init: {}", e)))?;
        tokio::pin!(sink);

        sink.send(Bytes::from(text_buf))
            .await
            .map_err(|e| MigrateError::transfer(&table.name, format!("COPY send: {}", e)))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| MigrateError::transfer(&table.name, format!("COPY finish: {}", e)))?;

        debug!("{}: copied {} rows", table.name, written);
        Ok(row_count)
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let row = client.query_one(&self.dialect.build_count(table)?, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn get_max_pk(&self, table: &Table) -> Result<Option<PkValue>> {
        let Some(pk_col) = table.primary_key.first().and_then(|pk| table.column(pk)) else {
            return Ok(None);
        };
        let client = self.client().await?;
        let row = client
            .query_opt(&self.dialect.build_max_key(table)?, &[])
            .await?;
        Ok(row
            .and_then(|r| r.get::<_, Option<String>>(0))
            .map(|text| PkValue::parse_for_type(&text, &pk_col.data_type)))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Render a value for COPY text format.
fn copy_text(value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Null => "\\N".to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::Text(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b.as_ref())),
        SqlValue::DateTimeOffset(dto) => dto.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        other => other
            .to_text()
            .map(|s| escape_copy_text(&s))
            .unwrap_or_default(),
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_escape_copy_text() {
        assert_eq!(escape_copy_text("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
        assert_eq!(escape_copy_text("plain"), "plain");
    }

    #[test]
    fn test_copy_text_values() {
        assert_eq!(copy_text(&SqlValue::Null), "\\N");
        assert_eq!(copy_text(&SqlValue::Bool(false)), "f");
        assert_eq!(copy_text(&SqlValue::I64(-3)), "-3");
        assert_eq!(
            copy_text(&SqlValue::Bytes(Cow::Owned(vec![0x01, 0xff]))),
            "\\\\x01ff"
        );
        assert_eq!(
            copy_text(&SqlValue::Text(Cow::Borrowed("line\nbreak"))),
            "line\\nbreak"
        );
    }
}
