//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, bad URL, missing origin store, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No type mapping exists for the requested origin/destination pair.
    #[error("Unsupported dialect pair: {origin} → {destination}")]
    UnsupportedDialectPair { origin: String, destination: String },

    /// The destination table must exist before its data can be filled.
    #[error("Need to create {0} table before filling it")]
    MissingTargetTable(String),

    /// Foreign keys form a cycle that inline constraint creation cannot satisfy.
    #[error("Circular foreign key dependency between tables: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// Origin database query error
    #[error("Source database error: {0}")]
    Source(String),

    /// Destination database query error
    #[error("Target database error: {0}")]
    Target(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row count validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// SQLite or MySQL (sqlx) error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// PostgreSQL error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL writer error
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run rather than a single table.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::UnsupportedDialectPair { .. }
                | MigrateError::MissingTargetTable(_)
                | MigrateError::DependencyCycle(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::UnsupportedDialectPair { .. }
            | MigrateError::MissingTargetTable(_)
            | MigrateError::DependencyCycle(_)
            | MigrateError::Yaml(_) => 1,
            MigrateError::Io(_) => 7,
            _ => 2,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
