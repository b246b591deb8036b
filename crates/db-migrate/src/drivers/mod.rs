//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`sqlite`]: SQLite driver (SQLx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres)
//! - [`mysql`]: MySQL/MariaDB driver (SQLx reader, mysql_async writer)
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `SourceReader`: For reading schema and data from the database
//! - `TargetWriter`: For writing schema and data to the database
//!
//! The orchestrator holds readers and writers as `Arc<dyn ...>` trait objects
//! handed out by [`DriverCatalog`](crate::core::catalog::DriverCatalog).
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `SourceReader` and `TargetWriter`
//! 3. Add `ToCanonical` / `FromCanonical` tables in `dialect::typemap`
//! 4. Wire the connect functions into `DriverCatalog::connect_source` /
//!    `connect_target`

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

// Re-export common utilities
pub use common::{SslMode, TlsBuilder};

// Re-export driver types
pub use mysql::{MysqlDialect, MysqlReader, MysqlWriter};
pub use postgres::{PostgresDialect, PostgresReader, PostgresWriter};
pub use sqlite::{SqliteDialect, SqliteReader, SqliteWriter};
