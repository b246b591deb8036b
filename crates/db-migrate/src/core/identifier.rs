//! Identifier validation, quoting and truncation.
//!
//! SQL identifiers cannot be bound as parameters, so every statement the
//! drivers build splices them in quoted. All quoting goes through here.

use crate::error::{MigrateError, Result};

/// Hard upper bound on identifier length before any dialect limit applies.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than 128 bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQLite identifier. SQLite follows the ANSI double-quote rule.
pub fn quote_sqlite(name: &str) -> Result<String> {
    quote_pg(name)
}

/// Cut an identifier to at most `max_len` bytes on a character boundary.
pub fn truncate_identifier(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Routines that reach outside the database (files, network, dynamic SQL).
const DANGEROUS_ROUTINES: &[&str] = &[
    "dbms_sql",
    "dbms_java",
    "dbms_scheduler",
    "utl_file",
    "utl_http",
    "utl_tcp",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "lo_import",
    "lo_export",
    "dblink",
    "load_file",
    "sys_exec",
    "load_extension",
];

/// Validate a check constraint definition read from an origin catalog.
///
/// Check expressions are replayed verbatim inside DDL, so anything beyond a
/// plain boolean expression is rejected: statement separators, comment
/// markers, EXEC/EXECUTE and routines that escape the database.
pub fn validate_check_constraint(definition: &str) -> Result<()> {
    let lower = definition.to_lowercase();

    if definition.contains(';') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Check constraint contains semicolon (possible injection): {:?}",
            definition
        )));
    }

    if definition.contains("--") || definition.contains("/*") || definition.contains("*/") {
        return Err(MigrateError::Config(format!(
            "SECURITY: Check constraint contains SQL comment markers (possible injection): {:?}",
            definition
        )));
    }

    if lower.split(|c: char| !c.is_alphanumeric() && c != '_').any(|word| {
        word == "exec" || word == "execute"
    }) {
        return Err(MigrateError::Config(format!(
            "SECURITY: Check constraint contains EXEC/EXECUTE keyword (possible injection): {:?}",
            definition
        )));
    }

    for routine in DANGEROUS_ROUTINES {
        for (idx, _) in lower.match_indices(routine) {
            let before_ok = lower[..idx]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            let after_ok = lower[idx + routine.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            if before_ok && after_ok {
                return Err(MigrateError::Config(format!(
                    "SECURITY: Check constraint calls routine '{}' (possible injection): {:?}",
                    routine, definition
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("molecule_dictionary").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"a".repeat(128)).is_ok());
        assert!(validate_identifier(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
        assert_eq!(
            quote_pg("users\"; DROP TABLE x; --").unwrap(),
            "\"users\"\"; DROP TABLE x; --\""
        );
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
        assert!(quote_mysql("bad\0").is_err());
    }

    #[test]
    fn test_quote_sqlite_matches_ansi() {
        assert_eq!(quote_sqlite("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn test_truncate_identifier() {
        assert_eq!(truncate_identifier("short", 30), "short");
        assert_eq!(
            truncate_identifier("component_class_relationship_map", 30),
            "component_class_relationship_m"
        );
        // "é" is two bytes; never split it
        assert_eq!(truncate_identifier("aé", 2), "a");
    }

    #[test]
    fn test_check_constraint_valid() {
        assert!(validate_check_constraint("value > 0").is_ok());
        assert!(validate_check_constraint("status IN ('active', 'inactive')").is_ok());
        assert!(validate_check_constraint("executed_at IS NOT NULL").is_ok());
        assert!(validate_check_constraint("utl_file_count >= 0").is_ok());
    }

    #[test]
    fn test_check_constraint_rejects_injection() {
        assert!(validate_check_constraint("1=1; DROP TABLE users").is_err());
        assert!(validate_check_constraint("1=1 -- comment").is_err());
        assert!(validate_check_constraint("1=1 /* x */").is_err());
        assert!(validate_check_constraint("EXEC(something)").is_err());
        assert!(validate_check_constraint("length(pg_read_file('/etc/passwd')) > 0").is_err());
        assert!(validate_check_constraint("UTL_HTTP.request('x') IS NULL").is_err());
    }
}
