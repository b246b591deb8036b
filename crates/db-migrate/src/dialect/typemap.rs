//! Per-dialect conversions to and from the canonical type system.
//!
//! Every supported dialect has a `*ToCanonical` (widening) and a
//! `*FromCanonical` (narrowing) table. The integer sizing tables for
//! zero-scale exact numerics are deliberate storage trade-offs per engine:
//!
//! | precision | MySQL     | PostgreSQL / SQLite | Oracle          |
//! |-----------|-----------|---------------------|-----------------|
//! | 1         | TINYINT   | SMALLINT            | NUMBER(1,0)     |
//! | 2         | SMALLINT  | SMALLINT            | NUMBER(2,0)     |
//! | 3         | MEDIUMINT | INTEGER             | NUMBER(3,0)     |
//! | 4         | INTEGER   | INTEGER             | NUMBER(4,0)     |
//! | other     | BIGINT    | BIGINT              | NUMBER(p≤38,0)  |

use crate::core::traits::TypeMapping;

use super::canonical::{widen_numeric, CanonicalType, CanonicalTypeInfo, FromCanonical, ToCanonical};
use super::DialectKind;

/// Widest decimal precision a 64-bit integer always holds.
const INT64_SAFE_DIGITS: u32 = 18;

/// Oracle NUMBER precision limit.
const ORACLE_MAX_PRECISION: u32 = 38;

/// PostgreSQL NUMERIC precision limit.
const PG_MAX_NUMERIC_PRECISION: u32 = 1000;

/// PostgreSQL varchar length limit.
const PG_MAX_VARCHAR: u32 = 10_485_760;

/// MySQL VARCHAR limit in characters under utf8mb4.
const MYSQL_MAX_VARCHAR: u32 = 16_383;

/// Oracle VARCHAR2 limit in bytes (standard string size).
const ORACLE_MAX_VARCHAR2: u32 = 4_000;

/// Split "timestamp(6) with time zone" into its lowercase base words,
/// dropping any parenthesized arguments.
fn base_type_name(data_type: &str) -> String {
    let mut out = String::with_capacity(data_type.len());
    let mut depth = 0usize;
    for ch in data_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lossy warning for zero-scale numerics wider than a BIGINT can hold.
fn sized_integer_mapping(target: String, precision: Option<u32>) -> TypeMapping {
    match precision {
        Some(p) if p > INT64_SAFE_DIGITS => TypeMapping::lossy(
            target,
            format!("{}-digit integer may overflow a 64-bit column.", p),
        ),
        _ => TypeMapping::lossless(target),
    }
}

// =============================================================================
// Oracle
// =============================================================================

/// Oracle to canonical type converter.
#[derive(Debug, Clone, Default)]
pub struct OracleToCanonical;

impl ToCanonical for OracleToCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn to_canonical(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> CanonicalTypeInfo {
        let base = base_type_name(data_type);

        if base.starts_with("timestamp") {
            return if base.contains("time zone") {
                CanonicalTypeInfo::lossless(CanonicalType::DateTimeTz)
            } else {
                CanonicalTypeInfo::lossless(CanonicalType::DateTime)
            };
        }
        if base.starts_with("interval") {
            return CanonicalTypeInfo::lossless(CanonicalType::Interval);
        }

        match base.as_str() {
            "number" | "numeric" | "decimal" | "dec" => {
                CanonicalTypeInfo::lossless(widen_numeric(precision, scale))
            }
            "integer" | "int" | "smallint" => CanonicalTypeInfo::lossless(
                CanonicalType::SizedInteger {
                    precision: Some(ORACLE_MAX_PRECISION),
                },
            ),
            "binary_float" => CanonicalTypeInfo::lossless(CanonicalType::Float32),
            "binary_double" | "float" | "double precision" | "real" => {
                CanonicalTypeInfo::lossless(CanonicalType::Float64)
            }
            "varchar2" | "nvarchar2" | "varchar" => {
                CanonicalTypeInfo::lossless(CanonicalType::Varchar(max_length))
            }
            "char" | "nchar" => CanonicalTypeInfo::lossless(CanonicalType::Char(max_length)),
            "clob" | "nclob" | "long" => CanonicalTypeInfo::lossless(CanonicalType::Text),
            "raw" => CanonicalTypeInfo::lossless(CanonicalType::Varbinary(max_length)),
            "blob" | "long raw" | "bfile" => CanonicalTypeInfo::lossless(CanonicalType::Blob),
            // Oracle DATE carries a time of day.
            "date" => CanonicalTypeInfo::lossless(CanonicalType::DateTime),
            "xmltype" => CanonicalTypeInfo::lossless(CanonicalType::Xml),
            "rowid" | "urowid" => CanonicalTypeInfo::lossy(
                CanonicalType::Varchar(Some(18)),
                "ROWID values are not portable and are copied as text.",
            ),
            _ => CanonicalTypeInfo::lossy(
                CanonicalType::Unknown(data_type.to_string()),
                format!("Unknown Oracle type '{}'.", data_type),
            ),
        }
    }
}

/// Canonical to Oracle type converter.
#[derive(Debug, Clone, Default)]
pub struct OracleFromCanonical;

impl FromCanonical for OracleFromCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping {
        match canonical {
            CanonicalType::Boolean => TypeMapping::lossless("NUMBER(1,0)"),
            CanonicalType::Int8 => TypeMapping::lossless("NUMBER(3,0)"),
            CanonicalType::Int16 => TypeMapping::lossless("NUMBER(5,0)"),
            CanonicalType::Int24 => TypeMapping::lossless("NUMBER(7,0)"),
            CanonicalType::Int32 => TypeMapping::lossless("NUMBER(10,0)"),
            CanonicalType::Int64 => TypeMapping::lossless("NUMBER(19,0)"),
            CanonicalType::SizedInteger { precision } => {
                let p = match precision {
                    Some(p) if *p > 0 => (*p).min(ORACLE_MAX_PRECISION),
                    _ => ORACLE_MAX_PRECISION,
                };
                TypeMapping::lossless(format!("NUMBER({},0)", p))
            }
            CanonicalType::Float32 => TypeMapping::lossless("BINARY_FLOAT"),
            CanonicalType::Float64 => TypeMapping::lossless("BINARY_DOUBLE"),
            CanonicalType::Decimal { precision, scale } => match (precision, scale) {
                (None, None) => TypeMapping::lossless("NUMBER"),
                (None, Some(s)) => TypeMapping::lossless(format!("NUMBER(*,{})", s)),
                (Some(p), s) if *p > ORACLE_MAX_PRECISION => TypeMapping::lossy(
                    match s {
                        Some(s) => format!("NUMBER({},{})", ORACLE_MAX_PRECISION, s),
                        None => format!("NUMBER({})", ORACLE_MAX_PRECISION),
                    },
                    format!("Precision {} clamped to {}.", p, ORACLE_MAX_PRECISION),
                ),
                (Some(p), Some(s)) => TypeMapping::lossless(format!("NUMBER({},{})", p, s)),
                (Some(p), None) => TypeMapping::lossless(format!("NUMBER({})", p)),
            },
            CanonicalType::Char(Some(n)) if *n <= 2000 => {
                TypeMapping::lossless(format!("CHAR({})", n))
            }
            CanonicalType::Varchar(Some(n)) | CanonicalType::Char(Some(n))
                if *n <= ORACLE_MAX_VARCHAR2 =>
            {
                TypeMapping::lossless(format!("VARCHAR2({})", n))
            }
            CanonicalType::Char(None) => TypeMapping::lossless("CHAR(1)"),
            CanonicalType::Varchar(_) | CanonicalType::Char(_) | CanonicalType::Text => {
                TypeMapping::lossless("CLOB")
            }
            CanonicalType::Binary(Some(n)) | CanonicalType::Varbinary(Some(n)) if *n <= 2000 => {
                TypeMapping::lossless(format!("RAW({})", n))
            }
            CanonicalType::Binary(_) | CanonicalType::Varbinary(_) | CanonicalType::Blob => {
                TypeMapping::lossless("BLOB")
            }
            CanonicalType::Date => TypeMapping::lossless("DATE"),
            CanonicalType::Time => {
                TypeMapping::lossy("VARCHAR2(32)", "Oracle has no TIME type; stored as text.")
            }
            CanonicalType::DateTime => TypeMapping::lossless("TIMESTAMP"),
            CanonicalType::DateTimeTz => TypeMapping::lossless("TIMESTAMP WITH TIME ZONE"),
            CanonicalType::Interval => TypeMapping::lossless("INTERVAL DAY TO SECOND"),
            CanonicalType::Uuid => TypeMapping::lossless("VARCHAR2(36)"),
            CanonicalType::Json => TypeMapping::lossless("CLOB"),
            CanonicalType::Xml => TypeMapping::lossless("XMLTYPE"),
            CanonicalType::Unknown(name) => {
                TypeMapping::lossy("CLOB", format!("Unknown type '{}' stored as CLOB.", name))
            }
        }
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// PostgreSQL to canonical type converter.
///
/// Accepts both `udt_name` spellings (int4, varchar, timestamptz) and the
/// SQL-standard names from information_schema.
#[derive(Debug, Clone, Default)]
pub struct PostgresToCanonical;

impl ToCanonical for PostgresToCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn to_canonical(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> CanonicalTypeInfo {
        let pg_lower = base_type_name(data_type);

        if pg_lower.ends_with("[]") || pg_lower.starts_with('_') || pg_lower == "array" {
            return CanonicalTypeInfo::lossy(
                CanonicalType::Text,
                format!("Array type '{}' stored as text.", data_type),
            );
        }

        match pg_lower.as_str() {
            "bool" | "boolean" => CanonicalTypeInfo::lossless(CanonicalType::Boolean),

            "int2" | "smallint" | "smallserial" => CanonicalTypeInfo::lossless(CanonicalType::Int16),
            "int4" | "integer" | "int" | "serial" => {
                CanonicalTypeInfo::lossless(CanonicalType::Int32)
            }
            "int8" | "bigint" | "bigserial" | "oid" => {
                CanonicalTypeInfo::lossless(CanonicalType::Int64)
            }

            "float4" | "real" => CanonicalTypeInfo::lossless(CanonicalType::Float32),
            "float8" | "double precision" => CanonicalTypeInfo::lossless(CanonicalType::Float64),

            "numeric" | "decimal" => CanonicalTypeInfo::lossless(widen_numeric(precision, scale)),
            "money" => CanonicalTypeInfo::lossless(CanonicalType::Decimal {
                precision: Some(19),
                scale: Some(2),
            }),

            "char" | "character" | "bpchar" => {
                CanonicalTypeInfo::lossless(CanonicalType::Char(max_length))
            }
            "varchar" | "character varying" => {
                CanonicalTypeInfo::lossless(CanonicalType::Varchar(max_length))
            }
            "text" | "citext" => CanonicalTypeInfo::lossless(CanonicalType::Text),
            "name" => CanonicalTypeInfo::lossless(CanonicalType::Varchar(Some(63))),

            "bytea" => CanonicalTypeInfo::lossless(CanonicalType::Blob),

            "date" => CanonicalTypeInfo::lossless(CanonicalType::Date),
            "time" | "time without time zone" => CanonicalTypeInfo::lossless(CanonicalType::Time),
            "timetz" | "time with time zone" => CanonicalTypeInfo::lossy(
                CanonicalType::Time,
                "Time with timezone loses timezone info.",
            ),
            "timestamp" | "timestamp without time zone" => {
                CanonicalTypeInfo::lossless(CanonicalType::DateTime)
            }
            "timestamptz" | "timestamp with time zone" => {
                CanonicalTypeInfo::lossless(CanonicalType::DateTimeTz)
            }
            "interval" => CanonicalTypeInfo::lossless(CanonicalType::Interval),

            "uuid" => CanonicalTypeInfo::lossless(CanonicalType::Uuid),
            "json" => CanonicalTypeInfo::lossless(CanonicalType::Json),
            "jsonb" => CanonicalTypeInfo::lossy(
                CanonicalType::Json,
                "JSONB binary features may be unavailable in target.",
            ),
            "xml" => CanonicalTypeInfo::lossless(CanonicalType::Xml),

            _ => CanonicalTypeInfo::lossy(
                CanonicalType::Unknown(data_type.to_string()),
                format!("Unknown PostgreSQL type '{}'.", data_type),
            ),
        }
    }
}

/// Canonical to PostgreSQL type converter.
#[derive(Debug, Clone, Default)]
pub struct PostgresFromCanonical;

impl FromCanonical for PostgresFromCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping {
        match canonical {
            CanonicalType::Boolean => TypeMapping::lossless("BOOLEAN"),

            // PG has no 1- or 3-byte integers
            CanonicalType::Int8 | CanonicalType::Int16 => TypeMapping::lossless("SMALLINT"),
            CanonicalType::Int24 | CanonicalType::Int32 => TypeMapping::lossless("INTEGER"),
            CanonicalType::Int64 => TypeMapping::lossless("BIGINT"),
            CanonicalType::SizedInteger { precision } => {
                sized_integer_mapping(generic_sized_integer(*precision).to_string(), *precision)
            }

            CanonicalType::Float32 => TypeMapping::lossless("REAL"),
            CanonicalType::Float64 => TypeMapping::lossless("DOUBLE PRECISION"),

            CanonicalType::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), _) if *p > PG_MAX_NUMERIC_PRECISION => TypeMapping::lossy(
                    "NUMERIC",
                    format!("Precision {} exceeds NUMERIC limit; stored unconstrained.", p),
                ),
                (Some(p), Some(s)) => TypeMapping::lossless(format!("NUMERIC({},{})", p, s)),
                (Some(p), None) => TypeMapping::lossless(format!("NUMERIC({})", p)),
                (None, _) => TypeMapping::lossless("NUMERIC"),
            },

            CanonicalType::Char(Some(n)) if *n <= PG_MAX_VARCHAR => {
                TypeMapping::lossless(format!("CHAR({})", n))
            }
            CanonicalType::Char(None) => TypeMapping::lossless("CHAR(1)"),
            CanonicalType::Varchar(Some(n)) if *n > 0 && *n <= PG_MAX_VARCHAR => {
                TypeMapping::lossless(format!("VARCHAR({})", n))
            }
            CanonicalType::Char(_) | CanonicalType::Varchar(_) | CanonicalType::Text => {
                TypeMapping::lossless("TEXT")
            }

            CanonicalType::Binary(_) | CanonicalType::Varbinary(_) | CanonicalType::Blob => {
                TypeMapping::lossless("BYTEA")
            }

            CanonicalType::Date => TypeMapping::lossless("DATE"),
            CanonicalType::Time => TypeMapping::lossless("TIME"),
            CanonicalType::DateTime => TypeMapping::lossless("TIMESTAMP"),
            CanonicalType::DateTimeTz => TypeMapping::lossless("TIMESTAMPTZ"),
            CanonicalType::Interval => TypeMapping::lossless("INTERVAL"),

            CanonicalType::Uuid => TypeMapping::lossless("UUID"),
            CanonicalType::Json => TypeMapping::lossless("JSON"),
            CanonicalType::Xml => TypeMapping::lossless("XML"),

            CanonicalType::Unknown(name) => {
                TypeMapping::lossy("TEXT", format!("Unknown type '{}' stored as text.", name))
            }
        }
    }
}

/// Integer sizing shared by PostgreSQL and SQLite.
fn generic_sized_integer(precision: Option<u32>) -> &'static str {
    match precision {
        None | Some(0) => "BIGINT",
        Some(p) if p > 4 => "BIGINT",
        Some(p) if p <= 2 => "SMALLINT",
        Some(_) => "INTEGER",
    }
}

// =============================================================================
// MySQL
// =============================================================================

/// MySQL to canonical type converter.
///
/// Expects the bare `DATA_TYPE` name, except that boolean columns are passed
/// as `tinyint(1)` (their `COLUMN_TYPE`), since MySQL stores BOOLEAN that way.
#[derive(Debug, Clone, Default)]
pub struct MysqlToCanonical;

impl ToCanonical for MysqlToCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn to_canonical(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> CanonicalTypeInfo {
        let mysql_lower = data_type.to_lowercase();
        if mysql_lower == "tinyint(1)" || mysql_lower == "bool" || mysql_lower == "boolean" {
            return CanonicalTypeInfo::lossless(CanonicalType::Boolean);
        }

        match base_type_name(&mysql_lower).as_str() {
            "tinyint" => CanonicalTypeInfo::lossless(CanonicalType::Int8),
            "smallint" | "year" => CanonicalTypeInfo::lossless(CanonicalType::Int16),
            "mediumint" => CanonicalTypeInfo::lossless(CanonicalType::Int24),
            "int" | "integer" => CanonicalTypeInfo::lossless(CanonicalType::Int32),
            "bigint" => CanonicalTypeInfo::lossless(CanonicalType::Int64),

            "decimal" | "numeric" => CanonicalTypeInfo::lossless(widen_numeric(precision, scale)),
            "float" => CanonicalTypeInfo::lossless(CanonicalType::Float32),
            "double" | "real" => CanonicalTypeInfo::lossless(CanonicalType::Float64),

            "bit" if max_length.or(precision).unwrap_or(1) == 1 => {
                CanonicalTypeInfo::lossless(CanonicalType::Boolean)
            }
            "bit" => CanonicalTypeInfo::lossless(CanonicalType::Varbinary(Some(8))),

            "char" => CanonicalTypeInfo::lossless(CanonicalType::Char(max_length)),
            "varchar" => CanonicalTypeInfo::lossless(CanonicalType::Varchar(max_length)),
            "tinytext" | "text" | "mediumtext" | "longtext" => {
                CanonicalTypeInfo::lossless(CanonicalType::Text)
            }
            "enum" | "set" => CanonicalTypeInfo::lossy(
                CanonicalType::Varchar(Some(255)),
                format!("{} stored as plain text.", data_type.to_uppercase()),
            ),

            "binary" => CanonicalTypeInfo::lossless(CanonicalType::Binary(max_length)),
            "varbinary" => CanonicalTypeInfo::lossless(CanonicalType::Varbinary(max_length)),
            "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                CanonicalTypeInfo::lossless(CanonicalType::Blob)
            }

            "date" => CanonicalTypeInfo::lossless(CanonicalType::Date),
            "time" => CanonicalTypeInfo::lossless(CanonicalType::Time),
            "datetime" | "timestamp" => CanonicalTypeInfo::lossless(CanonicalType::DateTime),

            "json" => CanonicalTypeInfo::lossless(CanonicalType::Json),

            _ => CanonicalTypeInfo::lossy(
                CanonicalType::Unknown(data_type.to_string()),
                format!("Unknown MySQL type '{}'.", data_type),
            ),
        }
    }
}

/// Canonical to MySQL type converter.
#[derive(Debug, Clone, Default)]
pub struct MysqlFromCanonical;

impl FromCanonical for MysqlFromCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping {
        match canonical {
            CanonicalType::Boolean => TypeMapping::lossless("TINYINT(1)"),

            CanonicalType::Int8 => TypeMapping::lossless("TINYINT"),
            CanonicalType::Int16 => TypeMapping::lossless("SMALLINT"),
            CanonicalType::Int24 => TypeMapping::lossless("MEDIUMINT"),
            CanonicalType::Int32 => TypeMapping::lossless("INT"),
            CanonicalType::Int64 => TypeMapping::lossless("BIGINT"),
            CanonicalType::SizedInteger { precision } => {
                let target = match precision {
                    Some(1) => "TINYINT",
                    Some(2) => "SMALLINT",
                    Some(3) => "MEDIUMINT",
                    Some(4) => "INTEGER",
                    _ => "BIGINT",
                };
                sized_integer_mapping(target.to_string(), *precision)
            }

            CanonicalType::Float32 => TypeMapping::lossless("FLOAT"),
            CanonicalType::Float64 => TypeMapping::lossless("DOUBLE"),

            CanonicalType::Decimal { precision, scale } => mysql_decimal(*precision, *scale),

            CanonicalType::Char(Some(n)) if *n <= 255 => {
                TypeMapping::lossless(format!("CHAR({})", n))
            }
            CanonicalType::Char(None) => TypeMapping::lossless("CHAR(1)"),
            CanonicalType::Varchar(Some(n)) | CanonicalType::Char(Some(n))
                if *n > 0 && *n <= MYSQL_MAX_VARCHAR =>
            {
                TypeMapping::lossless(format!("VARCHAR({})", n))
            }
            // MySQL needs an explicit VARCHAR length; unbounded text goes to LONGTEXT
            CanonicalType::Varchar(_) | CanonicalType::Char(_) | CanonicalType::Text => {
                TypeMapping::lossless("LONGTEXT")
            }

            CanonicalType::Binary(Some(n)) if *n <= 255 => {
                TypeMapping::lossless(format!("BINARY({})", n))
            }
            CanonicalType::Varbinary(Some(n)) | CanonicalType::Binary(Some(n))
                if *n > 0 && *n <= 65_535 =>
            {
                TypeMapping::lossless(format!("VARBINARY({})", n))
            }
            CanonicalType::Binary(_) | CanonicalType::Varbinary(_) | CanonicalType::Blob => {
                TypeMapping::lossless("LONGBLOB")
            }

            CanonicalType::Date => TypeMapping::lossless("DATE"),
            CanonicalType::Time => TypeMapping::lossless("TIME(6)"),
            CanonicalType::DateTime => TypeMapping::lossless("DATETIME(6)"),
            CanonicalType::DateTimeTz => TypeMapping::lossy(
                "DATETIME(6)",
                "MySQL DATETIME has no timezone; offsets are dropped.",
            ),
            CanonicalType::Interval => {
                TypeMapping::lossy("VARCHAR(64)", "MySQL has no INTERVAL type; stored as text.")
            }

            CanonicalType::Uuid => TypeMapping::lossless("CHAR(36)"),
            CanonicalType::Json => TypeMapping::lossless("JSON"),
            CanonicalType::Xml => TypeMapping::lossless("LONGTEXT"),

            CanonicalType::Unknown(name) => TypeMapping::lossy(
                "LONGTEXT",
                format!("Unknown type '{}' stored as LONGTEXT.", name),
            ),
        }
    }
}

/// MySQL DECIMAL with the engine's caps applied.
///
/// An unset (precision, scale) pair becomes the maximum, because a bare
/// DECIMAL in MySQL means DECIMAL(10,0). Explicit values above the cap are
/// clamped, and precision never drops below scale.
fn mysql_decimal(precision: Option<u32>, scale: Option<u32>) -> TypeMapping {
    let Some((max_p, max_s)) = DialectKind::Mysql.decimal_limits() else {
        return TypeMapping::lossless("DECIMAL");
    };
    let (p, s) = match (precision, scale) {
        (None, None) | (Some(0), None) | (Some(0), Some(0)) => {
            return TypeMapping::lossless(format!("DECIMAL({},{})", max_p, max_s))
        }
        (None, Some(s)) => (max_p, s),
        (Some(p), s) => (p, s.unwrap_or(0)),
    };
    let clamped_s = s.min(max_s);
    let clamped_p = p.min(max_p).max(clamped_s);
    let target = format!("DECIMAL({},{})", clamped_p, clamped_s);
    if clamped_p != p || clamped_s != s {
        TypeMapping::lossy(
            target,
            format!("DECIMAL({},{}) clamped to MySQL limits.", p, s),
        )
    } else {
        TypeMapping::lossless(target)
    }
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite to canonical type converter.
///
/// SQLite accepts any declared type; names are matched first, then SQLite's
/// own column-affinity rules decide.
#[derive(Debug, Clone, Default)]
pub struct SqliteToCanonical;

impl ToCanonical for SqliteToCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn to_canonical(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> CanonicalTypeInfo {
        let base = base_type_name(data_type);

        let canonical = match base.as_str() {
            "boolean" | "bool" => CanonicalType::Boolean,
            "tinyint" => CanonicalType::Int8,
            "smallint" | "int2" => CanonicalType::Int16,
            "mediumint" => CanonicalType::Int24,
            "int" | "int4" => CanonicalType::Int32,
            "integer" | "bigint" | "int8" => CanonicalType::Int64,
            "numeric" | "decimal" => widen_numeric(precision, scale),
            "real" | "double" | "double precision" | "float" => CanonicalType::Float64,
            "char" | "character" | "nchar" => CanonicalType::Char(max_length),
            "varchar" | "nvarchar" | "varying character" => CanonicalType::Varchar(max_length),
            "text" | "clob" => CanonicalType::Text,
            "blob" => CanonicalType::Blob,
            "date" => CanonicalType::Date,
            "time" => CanonicalType::Time,
            "datetime" | "timestamp" => CanonicalType::DateTime,
            "json" => CanonicalType::Json,
            "uuid" => CanonicalType::Uuid,
            "" => {
                return CanonicalTypeInfo::lossy(
                    CanonicalType::Text,
                    "Column without declared type stored as text.",
                )
            }
            other if other.contains("int") => CanonicalType::Int64,
            other if other.contains("char") || other.contains("clob") || other.contains("text") => {
                CanonicalType::Text
            }
            other if other.contains("blob") => CanonicalType::Blob,
            other if other.contains("real") || other.contains("floa") || other.contains("doub") => {
                CanonicalType::Float64
            }
            _ => {
                return CanonicalTypeInfo::lossy(
                    CanonicalType::Decimal {
                        precision: None,
                        scale: None,
                    },
                    format!("Type '{}' has NUMERIC affinity.", data_type),
                )
            }
        };
        CanonicalTypeInfo::lossless(canonical)
    }
}

/// Canonical to SQLite type converter.
#[derive(Debug, Clone, Default)]
pub struct SqliteFromCanonical;

impl FromCanonical for SqliteFromCanonical {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping {
        match canonical {
            CanonicalType::Boolean => TypeMapping::lossless("BOOLEAN"),
            CanonicalType::Int8 | CanonicalType::Int16 => TypeMapping::lossless("SMALLINT"),
            CanonicalType::Int24 | CanonicalType::Int32 => TypeMapping::lossless("INTEGER"),
            CanonicalType::Int64 => TypeMapping::lossless("BIGINT"),
            CanonicalType::SizedInteger { precision } => {
                sized_integer_mapping(generic_sized_integer(*precision).to_string(), *precision)
            }
            CanonicalType::Float32 => TypeMapping::lossless("FLOAT"),
            CanonicalType::Float64 => TypeMapping::lossless("FLOAT"),
            CanonicalType::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => TypeMapping::lossless(format!("NUMERIC({}, {})", p, s)),
                (Some(p), None) => TypeMapping::lossless(format!("NUMERIC({})", p)),
                (None, _) => TypeMapping::lossless("NUMERIC"),
            },
            CanonicalType::Char(Some(n)) => TypeMapping::lossless(format!("CHAR({})", n)),
            CanonicalType::Varchar(Some(n)) => TypeMapping::lossless(format!("VARCHAR({})", n)),
            CanonicalType::Char(None) | CanonicalType::Varchar(None) => {
                TypeMapping::lossless("VARCHAR")
            }
            CanonicalType::Text | CanonicalType::Xml => TypeMapping::lossless("TEXT"),
            CanonicalType::Binary(_) | CanonicalType::Varbinary(_) | CanonicalType::Blob => {
                TypeMapping::lossless("BLOB")
            }
            CanonicalType::Date => TypeMapping::lossless("DATE"),
            CanonicalType::Time => TypeMapping::lossless("TIME"),
            CanonicalType::DateTime => TypeMapping::lossless("DATETIME"),
            CanonicalType::DateTimeTz => TypeMapping::lossy(
                "DATETIME",
                "SQLite has no timezone-aware timestamp; stored as text.",
            ),
            CanonicalType::Interval => {
                TypeMapping::lossy("VARCHAR(64)", "SQLite has no INTERVAL type; stored as text.")
            }
            CanonicalType::Uuid => TypeMapping::lossless("CHAR(36)"),
            CanonicalType::Json => TypeMapping::lossless("JSON"),
            CanonicalType::Unknown(name) => {
                TypeMapping::lossy("TEXT", format!("Unknown type '{}' stored as text.", name))
            }
        }
    }
}
