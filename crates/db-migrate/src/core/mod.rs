//! Core abstractions for database-agnostic migration.
//!
//! - [`schema`]: Table, column, and constraint metadata types
//! - [`value`]: SQL value representation and row batches
//! - [`traits`]: Core traits for readers, writers, dialects, and type mappers
//! - [`identifier`]: Identifier quoting and check-constraint validation
//! - [`catalog`]: Type mapper registry and driver factories
//!
//! Drivers (`drivers/sqlite`, `drivers/postgres`, `drivers/mysql`) implement
//! these traits; the pipeline modules only ever see the traits.

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::DriverCatalog;
pub use schema::{
    CheckConstraint, Column, ForeignKey, Index, PkValue, Table, UniqueConstraint,
};
pub use traits::{
    ColumnMapping, Dialect, SourceReader, TargetWriter, TypeMapper, TypeMapping,
};
pub use value::{Batch, SqlValue, DATETIME_TEXT_FORMAT};
