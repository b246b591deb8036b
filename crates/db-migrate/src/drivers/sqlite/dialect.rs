//! SQLite SQL dialect.

use crate::core::identifier::quote_sqlite;
use crate::core::traits::Dialect;
use crate::dialect::DialectKind;
use crate::error::Result;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_sqlite(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{CheckConstraint, Column, ForeignKey, Table};

    #[test]
    fn test_create_table_inlines_constraints() {
        let mut table = Table::new("child");
        table.columns = vec![
            Column {
                is_nullable: false,
                ..Column::new("id", "INTEGER")
            },
            Column::new("parent_id", "INTEGER"),
        ];
        table.primary_key = vec!["id".to_string()];
        table.check_constraints = vec![CheckConstraint {
            name: "ck_child_id".to_string(),
            definition: "id > 0".to_string(),
        }];
        table.foreign_keys = vec![ForeignKey {
            name: "fk_child_parent".to_string(),
            columns: vec!["parent_id".to_string()],
            ref_table: "parent".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: Some("CASCADE".to_string()),
            on_update: None,
        }];

        let ddl = SqliteDialect.build_create_table(&table).unwrap();
        assert!(ddl.starts_with("CREATE TABLE \"child\" ("));
        assert!(ddl.contains("\"id\" INTEGER NOT NULL"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
        assert!(ddl.contains("CONSTRAINT \"ck_child_id\" CHECK (id > 0)"));
        assert!(ddl.contains(
            "CONSTRAINT \"fk_child_parent\" FOREIGN KEY (\"parent_id\") \
             REFERENCES \"parent\" (\"id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_count_and_max_key() {
        let mut table = Table::new("parent");
        table.columns = vec![Column::new("id", "INTEGER")];
        table.primary_key = vec!["id".to_string()];
        assert_eq!(
            SqliteDialect.build_count("parent").unwrap(),
            "SELECT COUNT(*) FROM \"parent\""
        );
        assert_eq!(
            SqliteDialect.build_max_key(&table).unwrap(),
            "SELECT CAST(\"parent\".\"id\" AS TEXT) FROM \"parent\" \
             ORDER BY \"parent\".\"id\" DESC LIMIT 1"
        );
    }
}
