//! PostgreSQL source reader implementation.
//!
//! Reads the tables of the connection's current schema. Metadata comes from
//! `information_schema` and `pg_catalog`; rows are paged with plain SELECTs.

use std::borrow::Cow;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tracing::{debug, info};

use crate::core::schema::{
    CheckConstraint, Column, ForeignKey, Index, PkValue, Table, UniqueConstraint,
};
use crate::core::traits::{Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::DialectKind;
use crate::error::{MigrateError, Result};

use super::{connect_pool, PostgresDialect};

/// PostgreSQL source reader implementation.
pub struct PostgresReader {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresReader {
    /// Connect to the origin database.
    pub async fn connect(url: &str, max_conns: usize) -> Result<Self> {
        let pool = connect_pool(url, max_conns, "origin").await?;
        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting connection for {}", context)))
    }

    /// Load columns for a table.
    async fn load_columns(&self, client: &Object, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                c.column_name::text,
                c.udt_name::text,
                c.character_maximum_length::int4,
                CASE WHEN c.udt_name = 'numeric' THEN c.numeric_precision::int4 END,
                CASE WHEN c.udt_name = 'numeric' THEN c.numeric_scale::int4 END,
                c.is_nullable = 'YES',
                c.column_default::text,
                c.is_identity = 'YES' OR COALESCE(c.column_default LIKE 'nextval(%', false),
                col_description(
                    (quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass,
                    c.ordinal_position::int4
                ),
                c.ordinal_position::int4
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema() AND c.table_name = $1
            ORDER BY c.ordinal_position
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        for row in rows {
            table.columns.push(Column {
                name: row.get(0),
                data_type: row.get(1),
                max_length: row.get::<_, Option<i32>>(2).and_then(non_negative),
                precision: row.get::<_, Option<i32>>(3).and_then(non_negative),
                scale: row.get::<_, Option<i32>>(4).and_then(non_negative),
                is_nullable: row.get(5),
                default: row.get(6),
                is_autoincrement: row.get(7),
                comment: row.get(8),
                ordinal_pos: row.get(9),
            });
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.name);
        Ok(())
    }

    /// Load primary key for a table.
    async fn load_primary_key(&self, client: &Object, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = current_schema()
              AND t.relname = $1
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        table.primary_key = rows.iter().map(|row| row.get(0)).collect();

        debug!("Primary key for {}: {:?}", table.name, table.primary_key);
        Ok(())
    }

    /// Estimated row count from the planner statistics.
    async fn load_row_count(&self, client: &Object, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT GREATEST(c.reltuples, 0)::int8
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema() AND c.relname = $1
        "#;

        let row = client.query_one(query, &[&table.name]).await?;
        table.row_count = row.get(0);
        Ok(())
    }

    async fn fetch_batch(&self, sql: &str, key_idx: Option<usize>, limit: usize) -> Result<Batch> {
        let client = self.client("reading rows").await?;
        let rows = client.query(sql, &[]).await?;
        let values = rows
            .iter()
            .map(row_values)
            .collect::<Result<Vec<_>>>()?;
        Ok(Batch::from_rows(values, key_idx, limit))
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    async fn extract_schema(&self) -> Result<Vec<Table>> {
        let client = self.client("extract_schema").await?;
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let mut table = Table::new(name);
            self.load_columns(&client, &mut table).await?;
            self.load_primary_key(&client, &mut table).await?;
            self.load_row_count(&client, &mut table).await?;
            tables.push(table);
        }

        info!("Extracted {} tables from PostgreSQL", tables.len());
        Ok(tables)
    }

    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()> {
        let client = self.client("load_unique_constraints").await?;
        let query = r#"
            SELECT
                c.conname::text,
                array_agg(a.attname::text ORDER BY array_position(c.conkey, a.attnum))
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
            WHERE n.nspname = current_schema() AND t.relname = $1 AND c.contype = 'u'
            GROUP BY c.conname
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        for row in rows {
            table.unique_constraints.push(UniqueConstraint {
                name: row.get(0),
                columns: row.get(1),
            });
        }

        debug!(
            "Loaded {} unique constraints for {}",
            table.unique_constraints.len(),
            table.name
        );
        Ok(())
    }

    async fn load_check_constraints(&self, table: &mut Table) -> Result<()> {
        let client = self.client("load_check_constraints").await?;
        let query = r#"
            SELECT c.conname::text, pg_get_constraintdef(c.oid)
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = current_schema() AND t.relname = $1 AND c.contype = 'c'
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        for row in rows {
            let definition: String = row.get(1);
            table.check_constraints.push(CheckConstraint {
                name: row.get(0),
                definition: strip_check_keyword(&definition),
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
        let client = self.client("load_foreign_keys").await?;
        let query = r#"
            SELECT
                c.conname::text,
                array_agg(a.attname::text ORDER BY array_position(c.conkey, a.attnum)),
                rt.relname::text,
                array_agg(ra.attname::text ORDER BY array_position(c.confkey, ra.attnum)),
                CASE c.confdeltype
                    WHEN 'r' THEN 'RESTRICT'
                    WHEN 'c' THEN 'CASCADE'
                    WHEN 'n' THEN 'SET NULL'
                    WHEN 'd' THEN 'SET DEFAULT'
                END,
                CASE c.confupdtype
                    WHEN 'r' THEN 'RESTRICT'
                    WHEN 'c' THEN 'CASCADE'
                    WHEN 'n' THEN 'SET NULL'
                    WHEN 'd' THEN 'SET DEFAULT'
                END
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN LATERAL unnest(c.conkey, c.confkey) AS k(attnum, refnum) ON true
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.refnum
            WHERE n.nspname = current_schema()
              AND t.relname = $1
              AND c.contype = 'f'
            GROUP BY c.conname, rt.relname, c.confdeltype, c.confupdtype
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        for row in rows {
            table.foreign_keys.push(ForeignKey {
                name: row.get(0),
                columns: row.get(1),
                ref_table: row.get(2),
                ref_columns: row.get(3),
                on_delete: row.get(4),
                on_update: row.get(5),
            });
        }

        debug!(
            "Loaded {} foreign keys for {}",
            table.foreign_keys.len(),
            table.name
        );
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        let client = self.client("load_indexes").await?;
        // Expression and partial indexes are left out
        let query = r#"
            SELECT
                i.relname::text,
                ix.indisunique,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum))
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = current_schema()
              AND t.relname = $1
              AND NOT ix.indisprimary
              AND ix.indpred IS NULL
              AND NOT (0 = ANY(ix.indkey))
            GROUP BY i.relname, ix.indisunique
            ORDER BY i.relname
        "#;

        let rows = client.query(query, &[&table.name]).await?;
        for row in rows {
            table.indexes.push(Index {
                name: row.get(0),
                is_unique: row.get(1),
                columns: row.get(2),
            });
        }

        debug!("Loaded {} indexes for {}", table.indexes.len(), table.name);
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let client = self.client("table_names").await?;
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE' AND table_schema = current_schema()
            ORDER BY table_name
        "#;
        let rows = client.query(query, &[]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let client = self.client("get_row_count").await?;
        let row = client.query_one(&self.dialect.build_count(table)?, &[]).await?;
        Ok(row.get::<_, i64>(0))
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
        self.pool.close();
    }
}

fn non_negative(v: i32) -> Option<u32> {
    u32::try_from(v).ok()
}

/// `CHECK ((price > 0)) NOT VALID` -> `(price > 0)`.
fn strip_check_keyword(definition: &str) -> String {
    let trimmed = definition.trim();
    let trimmed = trimmed.strip_suffix("NOT VALID").unwrap_or(trimmed).trim_end();
    let body = match trimmed.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("check") => trimmed[5..].trim_start(),
        _ => trimmed,
    };
    body.to_string()
}

/// Convert a PostgreSQL row to values, by the wire type of each column.
fn row_values(row: &Row) -> Result<Vec<SqlValue<'static>>> {
    (0..row.len()).map(|idx| column_value(row, idx)).collect()
}

fn column_value(row: &Row, idx: usize) -> Result<SqlValue<'static>> {
    let value = match row.columns()[idx].type_().name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(SqlValue::I16),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(SqlValue::I32),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(SqlValue::F32),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
        "uuid" => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(SqlValue::Uuid),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(SqlValue::DateTime),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)?
            .map(SqlValue::DateTimeOffset),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(SqlValue::Date),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(SqlValue::Time),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map(|b| SqlValue::Bytes(Cow::Owned(b))),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| SqlValue::Text(Cow::Owned(v.to_string()))),
        _ => row
            .try_get::<_, Option<String>>(idx)?
            .map(|s| SqlValue::Text(Cow::Owned(s))),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_check_keyword() {
        assert_eq!(strip_check_keyword("CHECK ((price > 0))"), "((price > 0))");
        assert_eq!(
            strip_check_keyword("CHECK ((qty >= 0)) NOT VALID"),
            "((qty >= 0))"
        );
        assert_eq!(strip_check_keyword("qty >= 0"), "qty >= 0");
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative(12), Some(12));
        assert_eq!(non_negative(-1), None);
    }
}
