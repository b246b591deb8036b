//! # db-migrate
//!
//! Resumable migration of relational databases between dialects.
//!
//! The library copies a whole database from an origin to a destination in
//! five phases:
//!
//! - **Schema**: origin tables are normalized for the destination dialect
//!   (types mapped through a canonical type set, identifiers truncated) and
//!   created in foreign-key dependency order
//! - **Data**: tables are copied in chunks on a bounded worker pool; an
//!   interrupted run resumes from what the destination already holds
//! - **Validation**: table sets and row counts are compared
//! - **Constraints**: unique, check and foreign key constraints are added
//!   once the data is validated
//! - **Indexes**: secondary indexes are created last
//!
//! Supported dialects are SQLite, PostgreSQL and MySQL; Oracle types are
//! mapped but no Oracle driver is built in.
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows, validated: {}", result.rows_transferred, result.validated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod order;
pub mod transfer;

// Re-exports for convenient access
pub use crate::core::{
    Batch, Column, DriverCatalog, PkValue, SourceReader, SqlValue, Table, TargetWriter,
    TypeMapper,
};
pub use config::{Config, MigrationConfig};
pub use dialect::DialectKind;
pub use error::{MigrateError, Result};
pub use normalize::{Exclusions, NormalizedTable, SchemaNormalizer};
pub use orchestrator::{MigrationResult, Orchestrator, TableResult, TableStatus};
pub use transfer::{CopyCursor, CopyOutcome, TransferEngine, TransferJob, TransferStats};
