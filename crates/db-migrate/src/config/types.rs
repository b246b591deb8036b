//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::dialect::redact_url;

/// Rows per chunk when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_bytes = sys.total_memory();
        let total_memory_gb = total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_bytes,
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin connection URL (`sqlite:`, `postgres://`, `mysql://`, `oracle://`).
    pub origin: String,

    /// Destination connection URL.
    pub destination: String,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Build a configuration from two URLs with default migration settings.
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            migration: MigrationConfig::default(),
        }
    }

    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("origin", &redact_url(&self.origin))
            .field("destination", &redact_url(&self.destination))
            .field("migration", &self.migration)
            .finish()
    }
}

/// Migration behavior configuration.
///
/// Performance fields are `Option` so "not set" (auto-tune) stays distinct
/// from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Number of parallel table workers. Auto-tuned from CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Rows per chunk (default: 1000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Connection pool size per side. Derived from workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Create tables on the destination (default: true).
    #[serde(default = "default_true")]
    pub copy_schema: bool,

    /// Copy rows (default: true).
    #[serde(default = "default_true")]
    pub copy_data: bool,

    /// Add unique, check and foreign key constraints after load (default: true).
    #[serde(default = "default_true")]
    pub copy_constraints: bool,

    /// Create indexes after load (default: true).
    #[serde(default = "default_true")]
    pub copy_indexes: bool,

    /// Tables left out of the migration entirely.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Columns left out, as `table.column`.
    #[serde(default)]
    pub exclude_columns: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_size: None,
            max_connections: None,
            copy_schema: true,
            copy_data: true,
            copy_constraints: true,
            copy_indexes: true,
            exclude_tables: Vec::new(),
            exclude_columns: Vec::new(),
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Workers: one per core, capped
        let workers = *self
            .workers
            .get_or_insert_with(|| resources.cpu_cores.clamp(1, 32));

        if self.chunk_size.is_none() {
            self.chunk_size = Some(DEFAULT_CHUNK_SIZE);
        }

        // Connection pool size: scale with workers
        if self.max_connections.is_none() {
            self.max_connections = Some((workers * 2).clamp(4, 64));
        }

        info!(
            "Auto-tuned config: workers={}, chunk_size={}, max_connections={}",
            self.get_workers(),
            self.get_chunk_size(),
            self.get_max_connections(),
        );

        self
    }

    // Accessors return the effective value, with fallbacks for configs that
    // were never auto-tuned.

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections
            .unwrap_or_else(|| (self.get_workers() * 2).clamp(4, 64))
    }

    /// Excluded columns as (table, column) pairs. Malformed entries are
    /// skipped; validation rejects them first.
    pub fn excluded_columns(&self) -> Vec<(String, String)> {
        self.exclude_columns
            .iter()
            .filter_map(|entry| entry.split_once('.'))
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect()
    }
}

fn default_true() -> bool {
    true
}
