//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteReader`]: Source reader over a database file
//! - [`SqliteWriter`]: Target writer, one connection at a time
//!
//! SQLite cannot add constraints to an existing table, so every constraint
//! is declared inline when the table is created.
//!
//! # Connection String
//!
//! ```text
//! sqlite://path/to/file.db
//! sqlite::memory:
//! ```

mod dialect;
mod reader;
mod writer;

pub use dialect::SqliteDialect;
pub use reader::SqliteReader;
pub use writer::SqliteWriter;

/// File path named by a `sqlite:` URL; `None` for in-memory databases.
fn database_path(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path() {
        assert_eq!(database_path("sqlite://data/app.db"), Some("data/app.db"));
        assert_eq!(database_path("sqlite:app.db?mode=ro"), Some("app.db"));
        assert_eq!(database_path("sqlite:///tmp/app.db"), Some("/tmp/app.db"));
        assert_eq!(database_path("sqlite::memory:"), None);
        assert_eq!(database_path("postgres://host/db"), None);
    }
}
