//! Migration orchestrator - main workflow coordinator.
//!
//! Runs the phases in order: schema, data, validation, then constraints and
//! indexes when validation passes. Table copies fan out over a semaphore
//! bounded pool; a failed table is recorded and its siblings carry on.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::catalog::DriverCatalog;
use crate::core::traits::{SourceReader, TargetWriter, TypeMapper};
use crate::dialect::DialectKind;
use crate::error::{MigrateError, Result};
use crate::normalize::{Exclusions, NormalizedTable, SchemaNormalizer};
use crate::order::{dependency_order, topological_order};
use crate::transfer::{CopyOutcome, TransferEngine, TransferJob, TransferStats};

/// Per-table outcome of the data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Rows were copied.
    Completed,
    /// Counts already matched; nothing copied.
    Skipped,
    /// The copy job failed.
    Failed,
    /// Data copy was not requested.
    NotCopied,
}

/// Result for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    /// Origin table name.
    pub name: String,
    /// Outcome of the data phase.
    pub status: TableStatus,
    /// Rows written.
    pub rows: u64,
    /// Chunks written.
    pub batches: u64,
    /// Error message when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableResult {
    fn from_stats(name: &str, stats: &TransferStats) -> Self {
        Self {
            name: name.to_string(),
            status: match stats.outcome {
                CopyOutcome::Completed => TableStatus::Completed,
                CopyOutcome::Skipped => TableStatus::Skipped,
            },
            rows: stats.rows,
            batches: stats.batches,
            error: None,
        }
    }

    fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            status: TableStatus::Failed,
            rows: 0,
            batches: 0,
            error: Some(error),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "validation_failed".
    pub status: String,

    /// Whether every table matched between origin and destination.
    pub validated: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables copied in this run.
    pub tables_success: usize,

    /// Tables already complete on the destination.
    pub tables_skipped: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Per-table outcomes, in data order.
    pub tables: Vec<TableResult>,
}

impl MigrationResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    mapper: Arc<dyn TypeMapper>,
}

impl Orchestrator {
    /// Create a new orchestrator with the built-in drivers.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_catalog(config, DriverCatalog::with_builtins()).await
    }

    /// Create a new orchestrator, connecting through `catalog`.
    ///
    /// The dialect pair is checked before any connection is opened.
    pub async fn with_catalog(config: Config, catalog: DriverCatalog) -> Result<Self> {
        config.validate()?;
        let origin = DialectKind::from_url(&config.origin)?;
        let destination = DialectKind::from_url(&config.destination)?;
        let mapper = catalog.require_mapper(origin, destination)?;
        info!("Migrating {} to {}", origin, destination);

        let max_conns = config.migration.get_max_connections();
        let source = catalog.connect_source(&config.origin, max_conns).await?;
        let target = match catalog.connect_target(&config.destination, max_conns).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            config,
            source,
            target,
            mapper,
        })
    }

    /// Create an orchestrator over already connected endpoints.
    pub fn with_connections(
        config: Config,
        catalog: &DriverCatalog,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Result<Self> {
        let mapper = catalog.require_mapper(source.kind(), target.kind())?;
        Ok(Self {
            config,
            source,
            target,
            mapper,
        })
    }

    /// Run the migration.
    ///
    /// Returns an error for configuration-class failures (unsupported pair,
    /// missing destination table, dependency cycle) and connection errors.
    /// Per-table failures only show up as `validated == false`.
    pub async fn run(self) -> Result<MigrationResult> {
        let outcome = self.run_phases().await;
        self.source.close().await;
        self.target.close().await;
        outcome
    }

    async fn run_phases(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let opts = &self.config.migration;
        info!("Starting migration run: {}", run_id);

        // Init: introspect, filter, normalize, order
        let exclusions = Exclusions::from_config(opts);
        let (tables, skipped) = self.prepare_tables(&exclusions).await?;
        let order = self.data_order(&tables)?;
        let ordered: Vec<&NormalizedTable> = order
            .iter()
            .filter_map(|name| tables.iter().find(|t| &t.source.name == name))
            .collect();
        info!("Found {} tables to migrate", ordered.len());

        // Phase 1: Schema
        if opts.copy_schema {
            info!("Phase 1: Creating schema on destination");
            for table in &ordered {
                // left over from an interrupted run
                if self.target.table_exists(&table.target.name).await? {
                    info!("Table {} already exists on destination", table.target.name);
                    continue;
                }
                debug!("Creating table {}", table.target.name);
                self.target.create_table(&table.target).await?;
            }
        }

        // Phase 2: Data
        let table_results = if opts.copy_data {
            info!("Phase 2: Transferring data");
            self.transfer_data(&ordered).await?
        } else {
            ordered
                .iter()
                .map(|t| TableResult {
                    name: t.source.name.clone(),
                    status: TableStatus::NotCopied,
                    rows: 0,
                    batches: 0,
                    error: None,
                })
                .collect()
        };

        // Phase 3: Validation
        info!("Phase 3: Validating row counts");
        let validated = self.validate(&ordered, &skipped, &exclusions).await?;

        if validated {
            info!("All tables successfully migrated");

            // Phase 4: Constraints
            if opts.copy_constraints && self.target.supports_post_hoc_constraints() {
                info!("Phase 4: Creating constraints");
                self.create_constraints(&ordered).await;
            }

            // Phase 5: Indexes
            if opts.copy_indexes {
                info!("Phase 5: Creating indexes");
                self.create_indexes(&ordered).await?;
            }

            info!("Migration successfully finished");
        } else {
            error!(
                "Table migration did not pass the validation, constraints and indexes not copied across"
            );
        }

        let completed_at = Utc::now();
        Ok(build_result(run_id, started_at, completed_at, validated, table_results))
    }

    /// Extract and normalize the origin schema.
    ///
    /// Returns the normalized tables and the origin names that were left out
    /// (excluded or without primary key).
    async fn prepare_tables(
        &self,
        exclusions: &Exclusions,
    ) -> Result<(Vec<NormalizedTable>, HashSet<String>)> {
        info!("Extracting schema from origin");
        let mut tables = self.source.extract_schema().await?;
        for table in tables.iter_mut() {
            if exclusions.excludes_table(&table.name) {
                continue;
            }
            self.source.load_table_metadata(table).await?;
        }

        let all_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        let normalizer = SchemaNormalizer::new(self.mapper.clone(), exclusions.clone());
        let normalized = normalizer.normalize_all(tables)?;

        let kept: HashSet<&str> = normalized.iter().map(|t| t.source.name.as_str()).collect();
        let mut skipped: HashSet<String> = all_names
            .into_iter()
            .filter(|name| !kept.contains(name.as_str()))
            .collect();
        skipped.extend(exclusions.tables().map(str::to_string));
        Ok((normalized, skipped))
    }

    /// Order in which tables are created and filled.
    fn data_order(&self, tables: &[NormalizedTable]) -> Result<Vec<String>> {
        let sources = tables.iter().map(|t| &t.source);
        if self.target.supports_post_hoc_constraints() {
            Ok(topological_order(sources))
        } else {
            dependency_order(sources)
        }
    }

    fn worker_count(&self) -> usize {
        let workers = self.config.migration.get_workers().max(1);
        match self.target.max_concurrent_writers() {
            Some(limit) => workers.min(limit.max(1)),
            None => workers,
        }
    }

    /// Copy every table on a bounded worker pool.
    async fn transfer_data(&self, tables: &[&NormalizedTable]) -> Result<Vec<TableResult>> {
        let workers = self.worker_count();
        info!("Copying {} tables with {} workers", tables.len(), workers);

        let engine = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            self.config.migration.get_chunk_size(),
        );
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(tables.len());

        for table in tables {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MigrateError::pool(e, "acquiring worker permit"))?;
            let engine = engine.clone();
            let job = TransferJob {
                source: table.source.clone(),
                target: table.target.clone(),
            };
            let table_name = table.source.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                engine.execute(&job).await
            });
            handles.push((table_name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut fatal: Option<MigrateError> = None;
        for (table_name, handle) in handles {
            match handle.await {
                Ok(Ok(stats)) => {
                    info!("{}: completed ({} rows)", table_name, stats.rows);
                    results.push(TableResult::from_stats(&table_name, &stats));
                }
                Ok(Err(e)) => {
                    error!("Table {} worker died: {}", table_name, e);
                    results.push(TableResult::failed(&table_name, e.to_string()));
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    error!("{}: task panicked - {}", table_name, e);
                    results.push(TableResult::failed(
                        &table_name,
                        format!("Task panicked: {}", e),
                    ));
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Compare table sets, then row counts.
    async fn validate(
        &self,
        tables: &[&NormalizedTable],
        skipped: &HashSet<String>,
        exclusions: &Exclusions,
    ) -> Result<bool> {
        if !self.config.migration.copy_data {
            info!("Data copy disabled; row counts not compared");
            return Ok(true);
        }

        let renamed: HashMap<&str, &str> = tables
            .iter()
            .map(|t| (t.source.name.as_str(), t.target.name.as_str()))
            .collect();
        let skipped_targets: HashSet<String> = skipped
            .iter()
            .map(|name| renamed.get(name.as_str()).map_or(name.clone(), |n| n.to_string()))
            .collect();

        let origin_names: BTreeSet<String> = self
            .source
            .table_names()
            .await?
            .into_iter()
            .filter(|name| !skipped.contains(name) && !exclusions.excludes_table(name))
            .map(|name| renamed.get(name.as_str()).map_or(name.clone(), |n| n.to_string()))
            .collect();
        let dest_names: BTreeSet<String> = self
            .target
            .table_names()
            .await?
            .into_iter()
            .filter(|name| !skipped_targets.contains(name))
            .collect();

        if origin_names != dest_names {
            let missing: Vec<&String> = origin_names.difference(&dest_names).collect();
            let unexpected: Vec<&String> = dest_names.difference(&origin_names).collect();
            error!(
                "Table sets differ between origin and destination: missing {:?}, unexpected {:?}",
                missing, unexpected
            );
            return Ok(false);
        }

        let mut validated = true;
        for table in tables {
            let origin_count = self.source.get_row_count(&table.source.name).await?;
            let dest_count = self.target.get_row_count(&table.target.name).await?;
            if origin_count != dest_count {
                error!(
                    "Row count failed for table {}, {}, {}",
                    table.source.name, origin_count, dest_count
                );
                validated = false;
            }
        }
        Ok(validated)
    }

    /// Unique constraints first, then checks, then foreign keys. Failures
    /// are logged and skipped.
    async fn create_constraints(&self, tables: &[&NormalizedTable]) {
        for table in tables {
            for uc in &table.deferred.unique_constraints {
                debug!("Creating unique constraint: {}.{}", table.target.name, uc.name);
                if let Err(e) = self.target.create_unique_constraint(&table.target, uc).await {
                    warn!("Failed to create unique constraint {}: {}", uc.name, e);
                }
            }
        }
        for table in tables {
            for chk in &table.deferred.check_constraints {
                debug!("Creating check constraint: {}.{}", table.target.name, chk.name);
                if let Err(e) = self.target.create_check_constraint(&table.target, chk).await {
                    warn!("Failed to create check constraint {}: {}", chk.name, e);
                }
            }
        }
        for table in tables {
            for fk in &table.deferred.foreign_keys {
                debug!("Creating FK: {}.{}", table.target.name, fk.name);
                if let Err(e) = self.target.create_foreign_key(&table.target, fk).await {
                    warn!("Failed to create FK {}: {}", fk.name, e);
                }
            }
        }
    }

    /// Create deferred indexes on the same bounded pool width as the data phase.
    async fn create_indexes(&self, tables: &[&NormalizedTable]) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.worker_count()));
        let mut handles = Vec::new();

        for table in tables {
            if table.deferred.indexes.is_empty() {
                continue;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MigrateError::pool(e, "acquiring index permit"))?;
            let target = self.target.clone();
            let dest = table.target.clone();
            let indexes = table.deferred.indexes.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                for index in &indexes {
                    debug!("Creating index: {}.{}", dest.name, index.name);
                    if let Err(e) = target.create_index(&dest, index).await {
                        warn!("Failed to create index {}: {}", index.name, e);
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Index creation task panicked: {}", e);
            }
        }
        Ok(())
    }
}

fn build_result(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    validated: bool,
    tables: Vec<TableResult>,
) -> MigrationResult {
    let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
    let count = |status: TableStatus| tables.iter().filter(|t| t.status == status).count();
    let rows_transferred: u64 = tables.iter().map(|t| t.rows).sum();
    let rows_per_second = if duration > 0.0 {
        (rows_transferred as f64 / duration) as i64
    } else {
        rows_transferred as i64
    };

    MigrationResult {
        run_id,
        status: if validated { "completed" } else { "validation_failed" }.to_string(),
        validated,
        duration_seconds: duration,
        started_at,
        completed_at,
        tables_total: tables.len(),
        tables_success: count(TableStatus::Completed),
        tables_skipped: count(TableStatus::Skipped),
        tables_failed: count(TableStatus::Failed),
        rows_transferred,
        rows_per_second,
        failed_tables: tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.name.clone())
            .collect(),
        tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_row(name: &str, status: TableStatus, rows: u64) -> TableResult {
        TableResult {
            name: name.to_string(),
            status,
            rows,
            batches: 1,
            error: None,
        }
    }

    #[test]
    fn test_build_result_totals() {
        let now = Utc::now();
        let result = build_result(
            "run-1".to_string(),
            now,
            now + chrono::Duration::seconds(2),
            false,
            vec![
                result_row("a", TableStatus::Completed, 100),
                result_row("b", TableStatus::Skipped, 0),
                result_row("c", TableStatus::Failed, 0),
            ],
        );
        assert_eq!(result.status, "validation_failed");
        assert_eq!(result.tables_total, 3);
        assert_eq!(result.tables_success, 1);
        assert_eq!(result.tables_skipped, 1);
        assert_eq!(result.tables_failed, 1);
        assert_eq!(result.failed_tables, vec!["c"]);
        assert_eq!(result.rows_transferred, 100);
        assert_eq!(result.rows_per_second, 50);
    }

    #[test]
    fn test_result_to_json() {
        let now = Utc::now();
        let result = build_result("run-2".to_string(), now, now, true, vec![]);
        let json = result.to_json().unwrap();
        assert!(json.contains("\"validated\": true"));
        assert!(json.contains("\"status\": \"completed\""));
        assert!(json.contains("\"run_id\": \"run-2\""));
    }
}
