//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] registers a type mapper per (origin, destination)
//! dialect pair and connects readers and writers from URLs. It is built
//! explicitly and handed to the orchestrator, so tests can register their
//! own mappers without global state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dialect::{
    redact_url, ComposedMapper, DialectKind, FromCanonical, MysqlFromCanonical, MysqlToCanonical,
    OracleFromCanonical, OracleToCanonical, PostgresFromCanonical, PostgresToCanonical,
    SqliteFromCanonical, SqliteToCanonical, ToCanonical,
};
use crate::drivers::{
    MysqlReader, MysqlWriter, PostgresReader, PostgresWriter, SqliteReader, SqliteWriter,
};
use crate::error::{MigrateError, Result};

use super::traits::{SourceReader, TargetWriter, TypeMapper};

/// Registry of type mappers keyed by (origin, destination) dialect.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = DriverCatalog::with_builtins();
/// let mapper = catalog.require_mapper(DialectKind::Mysql, DialectKind::Sqlite)?;
/// let reader = catalog.connect_source("mysql://root:pw@localhost/app", 4).await?;
/// ```
#[derive(Default)]
pub struct DriverCatalog {
    type_mappers: HashMap<(DialectKind, DialectKind), Arc<dyn TypeMapper>>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every supported pair registered.
    ///
    /// Each pair is a [`ComposedMapper`] chaining the origin's
    /// `ToCanonical` with the destination's `FromCanonical`. Oracle to
    /// Oracle is the one unsupported combination.
    pub fn with_builtins() -> Self {
        let to_canonical = |kind: DialectKind| -> Arc<dyn ToCanonical> {
            match kind {
                DialectKind::Oracle => Arc::new(OracleToCanonical),
                DialectKind::Postgres => Arc::new(PostgresToCanonical),
                DialectKind::Mysql => Arc::new(MysqlToCanonical),
                DialectKind::Sqlite => Arc::new(SqliteToCanonical),
            }
        };
        let from_canonical = |kind: DialectKind| -> Arc<dyn FromCanonical> {
            match kind {
                DialectKind::Oracle => Arc::new(OracleFromCanonical),
                DialectKind::Postgres => Arc::new(PostgresFromCanonical),
                DialectKind::Mysql => Arc::new(MysqlFromCanonical),
                DialectKind::Sqlite => Arc::new(SqliteFromCanonical),
            }
        };

        let mut catalog = Self::new();
        for origin in DialectKind::ALL {
            for destination in DialectKind::ALL {
                if origin == DialectKind::Oracle && destination == DialectKind::Oracle {
                    continue;
                }
                catalog.register_mapper(
                    origin,
                    destination,
                    Arc::new(ComposedMapper::new(
                        to_canonical(origin),
                        from_canonical(destination),
                    )),
                );
            }
        }
        catalog
    }

    /// Register a type mapper for an origin→destination pair.
    pub fn register_mapper(
        &mut self,
        origin: DialectKind,
        destination: DialectKind,
        mapper: Arc<dyn TypeMapper>,
    ) {
        self.type_mappers.insert((origin, destination), mapper);
    }

    /// Get the type mapper for a pair.
    pub fn get_mapper(
        &self,
        origin: DialectKind,
        destination: DialectKind,
    ) -> Option<Arc<dyn TypeMapper>> {
        self.type_mappers.get(&(origin, destination)).cloned()
    }

    /// Get the type mapper for a pair, failing with
    /// [`MigrateError::UnsupportedDialectPair`] if none is registered.
    pub fn require_mapper(
        &self,
        origin: DialectKind,
        destination: DialectKind,
    ) -> Result<Arc<dyn TypeMapper>> {
        self.get_mapper(origin, destination)
            .ok_or_else(|| MigrateError::UnsupportedDialectPair {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })
    }

    /// Check if a mapper is registered for a pair.
    pub fn has_mapper(&self, origin: DialectKind, destination: DialectKind) -> bool {
        self.type_mappers.contains_key(&(origin, destination))
    }

    /// All registered pairs, sorted.
    pub fn mapper_pairs(&self) -> Vec<(DialectKind, DialectKind)> {
        let mut pairs: Vec<_> = self.type_mappers.keys().copied().collect();
        pairs.sort();
        pairs
    }

    // =========================================================================
    // Factory methods for creating readers and writers
    // =========================================================================

    /// Connect a reader for the origin URL.
    pub async fn connect_source(
        &self,
        url: &str,
        max_conns: usize,
    ) -> Result<Arc<dyn SourceReader>> {
        match DialectKind::from_url(url)? {
            DialectKind::Sqlite => Ok(Arc::new(SqliteReader::connect(url, max_conns).await?)),
            DialectKind::Postgres => Ok(Arc::new(PostgresReader::connect(url, max_conns).await?)),
            DialectKind::Mysql => Ok(Arc::new(MysqlReader::connect(url, max_conns).await?)),
            DialectKind::Oracle => Err(no_wire_driver(url)),
        }
    }

    /// Connect a writer for the destination URL.
    pub async fn connect_target(
        &self,
        url: &str,
        max_conns: usize,
    ) -> Result<Arc<dyn TargetWriter>> {
        match DialectKind::from_url(url)? {
            DialectKind::Sqlite => Ok(Arc::new(SqliteWriter::connect(url).await?)),
            DialectKind::Postgres => Ok(Arc::new(PostgresWriter::connect(url, max_conns).await?)),
            DialectKind::Mysql => Ok(Arc::new(MysqlWriter::connect(url, max_conns).await?)),
            DialectKind::Oracle => Err(no_wire_driver(url)),
        }
    }
}

fn no_wire_driver(url: &str) -> MigrateError {
    MigrateError::Config(format!(
        "No Oracle driver is built in; cannot connect to {}",
        redact_url(url)
    ))
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("type_mappers", &self.mapper_pairs())
            .finish()
    }
}
