//! Pipeline tests over the in-memory reader/writer pair.

mod common;

use std::sync::Arc;

use common::{
    child_table, composite_table, simple_row, simple_table, MemoryReader, MemoryWriter,
};
use db_migrate::core::schema::{Index, UniqueConstraint};
use db_migrate::{
    Config, DialectKind, DriverCatalog, MigrateError, MigrationResult, Orchestrator, PkValue,
    SqlValue, TableStatus,
};

fn config(chunk_size: usize, workers: usize) -> Config {
    let mut config = Config::new("sqlite://origin.db", "sqlite://dest.db");
    config.migration.chunk_size = Some(chunk_size);
    config.migration.workers = Some(workers);
    config
}

async fn run(
    config: Config,
    reader: MemoryReader,
    writer: Arc<MemoryWriter>,
) -> db_migrate::Result<MigrationResult> {
    let catalog = DriverCatalog::with_builtins();
    let orchestrator =
        Orchestrator::with_connections(config, &catalog, Arc::new(reader), writer)?;
    orchestrator.run().await
}

fn ids(rows: &[Vec<SqlValue<'static>>]) -> Vec<i64> {
    rows.iter()
        .map(|row| match PkValue::from_sql_value(&row[0]) {
            Some(PkValue::Int(id)) => id,
            other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_end_to_end_single_writer_destination() {
    let reader = MemoryReader::new(
        DialectKind::Sqlite,
        vec![simple_table("parent", 25), child_table("child", "parent", 25)],
    );
    let writer = Arc::new(MemoryWriter::new(DialectKind::Sqlite));

    let result = run(config(10, 4), reader, writer.clone()).await.unwrap();

    assert!(result.validated);
    assert_eq!(result.status, "completed");
    assert_eq!(result.rows_transferred, 50);
    assert_eq!(result.tables_success, 2);

    let log = writer.log.lock().unwrap();
    assert_eq!(log.created, vec!["parent", "child"]);
    assert_eq!(log.batches["parent"], vec![10, 10, 5]);
    assert_eq!(log.batches["child"], vec![10, 10, 5]);
    // constraints were declared with the tables, none added afterwards
    assert!(log.constraints.is_empty());
    drop(log);

    let tables = writer.tables.lock().unwrap();
    assert_eq!(tables["child"].schema.foreign_keys.len(), 1);
    assert_eq!(tables["child"].rows.len(), 25);
}

#[tokio::test]
async fn test_rerun_over_complete_destination_is_noop() {
    let origin = simple_table("items", 25);
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![origin.clone()]);
    let reads = reader.reads.clone();
    let writer = Arc::new(
        MemoryWriter::new(DialectKind::Sqlite).with_table(origin.schema.clone(), origin.rows),
    );

    let result = run(config(10, 2), reader, writer.clone()).await.unwrap();

    assert!(result.validated);
    assert_eq!(result.tables_skipped, 1);
    assert_eq!(result.rows_transferred, 0);
    assert_eq!(result.tables[0].status, TableStatus::Skipped);
    assert_eq!(*reads.lock().unwrap(), 0);
    assert!(writer.batch_sizes("items").is_empty());
    assert!(writer.log.lock().unwrap().created.is_empty());
}

#[tokio::test]
async fn test_resume_copies_only_missing_rows() {
    let origin = simple_table("items", 25);
    let present: Vec<_> = (1..=7).map(simple_row).collect();
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![origin.clone()]);
    let writer = Arc::new(
        MemoryWriter::new(DialectKind::Sqlite).with_table(origin.schema.clone(), present),
    );

    let result = run(config(5, 1), reader, writer.clone()).await.unwrap();

    assert!(result.validated);
    assert_eq!(result.rows_transferred, 18);
    assert_eq!(writer.batch_sizes("items"), vec![5, 5, 5, 3]);
    assert_eq!(ids(&writer.rows("items")), (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_composite_key_resumes_by_offset() {
    let origin = composite_table("pairs", 23);
    let present = origin.rows[..8].to_vec();
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![origin.clone()]);
    let writer = Arc::new(
        MemoryWriter::new(DialectKind::Sqlite).with_table(origin.schema.clone(), present),
    );

    let result = run(config(5, 1), reader, writer.clone()).await.unwrap();

    assert!(result.validated);
    assert_eq!(result.rows_transferred, 15);
    assert_eq!(writer.batch_sizes("pairs"), vec![5, 5, 5]);
    assert_eq!(writer.rows("pairs"), origin.rows);
}

#[tokio::test]
async fn test_failed_table_gates_constraints_and_indexes() {
    let mut parent = simple_table("parent", 12);
    parent.schema.unique_constraints = vec![UniqueConstraint {
        name: "uq_parent_label".to_string(),
        columns: vec!["label".to_string()],
    }];
    parent.schema.indexes = vec![Index {
        name: "ix_parent_label_id".to_string(),
        columns: vec!["label".to_string(), "id".to_string()],
        is_unique: false,
    }];
    let reader = MemoryReader::new(
        DialectKind::Postgres,
        vec![parent, child_table("child", "parent", 12)],
    );
    let writer = Arc::new(MemoryWriter::new(DialectKind::Postgres).failing_on("child"));

    let result = run(config(5, 2), reader, writer.clone()).await.unwrap();

    assert!(!result.validated);
    assert_eq!(result.status, "validation_failed");
    assert_eq!(result.tables_failed, 1);
    assert_eq!(result.failed_tables, vec!["child"]);
    assert_eq!(writer.rows("parent").len(), 12);

    let log = writer.log.lock().unwrap();
    assert!(log.constraints.is_empty());
    assert!(log.indexes.is_empty());
}

#[tokio::test]
async fn test_post_hoc_destination_restores_constraints_after_load() {
    let mut parent = simple_table("parent", 12);
    parent.schema.unique_constraints = vec![UniqueConstraint {
        name: "uq_parent_label".to_string(),
        columns: vec!["label".to_string()],
    }];
    parent.schema.indexes = vec![Index {
        name: "ix_parent_label_id".to_string(),
        columns: vec!["label".to_string(), "id".to_string()],
        is_unique: false,
    }];
    let reader = MemoryReader::new(
        DialectKind::Postgres,
        vec![parent, child_table("child", "parent", 12)],
    );
    let writer = Arc::new(MemoryWriter::new(DialectKind::Postgres));

    let result = run(config(5, 4), reader, writer.clone()).await.unwrap();

    assert!(result.validated);
    let log = writer.log.lock().unwrap();
    assert!(log.constraints.contains(&"uq_parent_label".to_string()));
    assert!(log.constraints.contains(&"fk_child_parent".to_string()));
    assert_eq!(log.indexes, vec!["ix_parent_label_id"]);
    drop(log);

    // created without the deferred constraints
    let tables = writer.tables.lock().unwrap();
    assert!(tables["child"].schema.foreign_keys.is_empty());
    assert!(tables["parent"].schema.unique_constraints.is_empty());
}

#[tokio::test]
async fn test_missing_destination_table_is_fatal() {
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![simple_table("items", 3)]);
    let writer = Arc::new(MemoryWriter::new(DialectKind::Sqlite));
    let mut config = config(10, 1);
    config.migration.copy_schema = false;

    let err = run(config, reader, writer).await.unwrap_err();
    assert!(matches!(err, MigrateError::MissingTargetTable(ref t) if t == "items"));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_dependency_cycle_is_fatal_before_any_copy() {
    let a = child_table("a", "b", 3);
    let b = child_table("b", "a", 3);
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![a, b]);
    let writer = Arc::new(MemoryWriter::new(DialectKind::Sqlite));

    let err = run(config(10, 1), reader, writer.clone()).await.unwrap_err();
    assert!(matches!(err, MigrateError::DependencyCycle(_)));
    assert!(writer.log.lock().unwrap().created.is_empty());
}

#[tokio::test]
async fn test_cycle_is_accepted_by_post_hoc_destination() {
    let a = child_table("a", "b", 3);
    let b = child_table("b", "a", 3);
    let reader = MemoryReader::new(DialectKind::Postgres, vec![a, b]);
    let writer = Arc::new(MemoryWriter::new(DialectKind::Postgres));

    let result = run(config(10, 2), reader, writer.clone()).await.unwrap();
    assert!(result.validated);
    assert_eq!(writer.log.lock().unwrap().constraints.len(), 2);
}

#[test]
fn test_unsupported_pair_is_rejected() {
    let reader = MemoryReader::new(DialectKind::Oracle, vec![]);
    let writer = Arc::new(MemoryWriter::new(DialectKind::Oracle));
    let catalog = DriverCatalog::with_builtins();

    let err = Orchestrator::with_connections(config(10, 1), &catalog, Arc::new(reader), writer)
        .err()
        .unwrap();
    assert!(matches!(err, MigrateError::UnsupportedDialectPair { .. }));
}

#[tokio::test]
async fn test_copy_data_disabled_marks_tables_not_copied() {
    let reader = MemoryReader::new(DialectKind::Sqlite, vec![simple_table("items", 4)]);
    let writer = Arc::new(MemoryWriter::new(DialectKind::Sqlite));
    let mut config = config(10, 1);
    config.migration.copy_data = false;

    let result = run(config, reader, writer.clone()).await.unwrap();
    assert!(result.validated);
    assert_eq!(result.tables[0].status, TableStatus::NotCopied);
    assert_eq!(writer.log.lock().unwrap().created, vec!["items"]);
    assert!(writer.rows("items").is_empty());
}

#[tokio::test]
async fn test_excluded_table_is_left_out() {
    let reader = MemoryReader::new(
        DialectKind::Sqlite,
        vec![simple_table("items", 4), simple_table("audit", 9)],
    );
    let writer = Arc::new(MemoryWriter::new(DialectKind::Sqlite));
    let mut config = config(10, 1);
    config.migration.exclude_tables = vec!["audit".to_string()];

    let result = run(config, reader, writer.clone()).await.unwrap();
    assert!(result.validated);
    assert_eq!(result.tables_total, 1);
    assert_eq!(writer.log.lock().unwrap().created, vec!["items"]);
}
