//! MySQL/MariaDB SQL dialect.

use crate::core::identifier::quote_mysql;
use crate::core::schema::Column;
use crate::core::traits::Dialect;
use crate::dialect::DialectKind;
use crate::error::Result;

/// MySQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn text_cast_type(&self) -> &'static str {
        "CHAR"
    }

    fn select_column(&self, col: &Column) -> Result<String> {
        let quoted = self.quote_ident(&col.name)?;
        let expr = match col.data_type.to_lowercase().as_str() {
            // decimals wider than rust_decimal and out-of-range times go through text
            "decimal" | "numeric" | "time" | "enum" | "set" | "json" => {
                format!("CAST({quoted} AS CHAR) AS {quoted}")
            }
            "bit" | "year" => format!("CAST({quoted} AS SIGNED) AS {quoted}"),
            _ => quoted,
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{PkValue, Table};

    fn orders() -> Table {
        let mut table = Table::new("orders");
        table.columns = vec![
            Column::new("id", "bigint"),
            Column::new("total", "decimal"),
            Column::new("flags", "bit"),
        ];
        table.primary_key = vec!["id".to_string()];
        table
    }

    #[test]
    fn test_quote_ident() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("users").unwrap(), "`users`");
        assert_eq!(dialect.quote_ident("user`table").unwrap(), "`user``table`");
    }

    #[test]
    fn test_keyset_select_casts_columns() {
        let sql = MysqlDialect
            .build_keyset_select(&orders(), Some(&PkValue::Int(9)), 50)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `id`, CAST(`total` AS CHAR) AS `total`, CAST(`flags` AS SIGNED) AS `flags` \
             FROM `orders` WHERE `orders`.`id` > 9 ORDER BY `orders`.`id` LIMIT 50"
        );
    }

    #[test]
    fn test_decimal_key_sorts_by_column_not_char_alias() {
        let mut table = Table::new("invoices");
        table.columns = vec![Column::new("id", "decimal"), Column::new("memo", "varchar")];
        table.primary_key = vec!["id".to_string()];

        let sql = MysqlDialect
            .build_keyset_select(&table, Some(&PkValue::String("9".to_string())), 10)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT CAST(`id` AS CHAR) AS `id`, `memo` FROM `invoices` \
             WHERE `invoices`.`id` > '9' ORDER BY `invoices`.`id` LIMIT 10"
        );
    }

    #[test]
    fn test_offset_select() {
        let mut table = orders();
        table.primary_key = vec!["id".to_string(), "flags".to_string()];
        let sql = MysqlDialect.build_offset_select(&table, 20, 10).unwrap();
        assert!(sql.ends_with("ORDER BY `orders`.`id`, `orders`.`flags` LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_max_key_casts_to_char() {
        assert_eq!(
            MysqlDialect.build_max_key(&orders()).unwrap(),
            "SELECT CAST(`orders`.`id` AS CHAR) FROM `orders` ORDER BY `orders`.`id` DESC LIMIT 1"
        );
    }
}
