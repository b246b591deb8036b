//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::identifier::quote_pg;
use crate::core::schema::Column;
use crate::core::traits::Dialect;
use crate::dialect::DialectKind;
use crate::error::Result;

/// Column types the reader decodes into typed values. Everything else is
/// read back as text.
const NATIVE_TYPES: &[&str] = &[
    "bool",
    "int2",
    "int4",
    "int8",
    "float4",
    "float8",
    "text",
    "varchar",
    "bpchar",
    "name",
    "uuid",
    "date",
    "time",
    "timestamp",
    "timestamptz",
    "bytea",
    "json",
    "jsonb",
];

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Whether values of this `udt_name` decode without a text cast.
    pub fn decodes_natively(udt_name: &str) -> bool {
        NATIVE_TYPES.contains(&udt_name.to_lowercase().as_str())
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    // numeric goes through text so values beyond 28 digits survive
    fn select_column(&self, col: &Column) -> Result<String> {
        let quoted = self.quote_ident(&col.name)?;
        if Self::decodes_natively(&col.data_type) {
            Ok(quoted)
        } else {
            Ok(format!("{quoted}::text AS {quoted}"))
        }
    }
}
