//! In-memory reader and writer used by the pipeline tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db_migrate::core::schema::{CheckConstraint, ForeignKey, Index, UniqueConstraint};
use db_migrate::{
    Batch, Column, DialectKind, MigrateError, PkValue, Result, SourceReader, SqlValue, Table,
    TargetWriter,
};

pub type Row = Vec<SqlValue<'static>>;

/// A table and its rows.
#[derive(Debug, Clone)]
pub struct MemTable {
    pub schema: Table,
    pub rows: Vec<Row>,
}

/// Everything the writer was asked to do.
#[derive(Debug, Default)]
pub struct WriterLog {
    pub created: Vec<String>,
    pub batches: BTreeMap<String, Vec<usize>>,
    pub constraints: Vec<String>,
    pub indexes: Vec<String>,
}

/// Origin side.
pub struct MemoryReader {
    kind: DialectKind,
    tables: BTreeMap<String, MemTable>,
    pub reads: Arc<Mutex<usize>>,
}

impl MemoryReader {
    pub fn new(kind: DialectKind, tables: Vec<MemTable>) -> Self {
        Self {
            kind,
            tables: tables
                .into_iter()
                .map(|t| (t.schema.name.clone(), t))
                .collect(),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::Source(format!("no table {}", name)))
    }

    fn sorted_rows(&self, table: &Table) -> Result<Vec<Row>> {
        let mem = self.table(&table.name)?;
        let key_idx: Vec<usize> = mem
            .schema
            .primary_key
            .iter()
            .filter_map(|pk| mem.schema.column_index(pk))
            .collect();
        let mut rows = mem.rows.clone();
        rows.sort_by_key(|row| row_key(row, &key_idx));
        Ok(rows)
    }
}

fn row_key(row: &Row, key_idx: &[usize]) -> Vec<Option<PkValue>> {
    key_idx
        .iter()
        .map(|&i| PkValue::from_sql_value(&row[i]))
        .collect()
}

#[async_trait]
impl SourceReader for MemoryReader {
    fn kind(&self) -> DialectKind {
        self.kind
    }

    async fn extract_schema(&self) -> Result<Vec<Table>> {
        Ok(self
            .tables
            .values()
            .map(|t| {
                let mut table = Table::new(t.schema.name.clone());
                table.columns = t.schema.columns.clone();
                table.primary_key = t.schema.primary_key.clone();
                table.row_count = t.rows.len() as i64;
                table
            })
            .collect())
    }

    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()> {
        table.unique_constraints = self.table(&table.name)?.schema.unique_constraints.clone();
        Ok(())
    }

    async fn load_check_constraints(&self, table: &mut Table) -> Result<()> {
        table.check_constraints = self.table(&table.name)?.schema.check_constraints.clone();
        Ok(())
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        table.foreign_keys = self.table(&table.name)?.schema.foreign_keys.clone();
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        table.indexes = self.table(&table.name)?.schema.indexes.clone();
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn read_after_key(
        &self,
        table: &Table,
        after: Option<&PkValue>,
        limit: usize,
    ) -> Result<Batch> {
        *self.reads.lock().unwrap() += 1;
        let key_idx = table.column_index(&table.primary_key[0]);
        let rows: Vec<Row> = self
            .sorted_rows(table)?
            .into_iter()
            .filter(|row| match (after, key_idx) {
                (Some(after), Some(idx)) => {
                    PkValue::from_sql_value(&row[idx]).is_some_and(|k| &k > after)
                }
                _ => true,
            })
            .take(limit)
            .collect();
        Ok(Batch::from_rows(rows, key_idx, limit))
    }

    async fn read_at_offset(&self, table: &Table, offset: i64, limit: usize) -> Result<Batch> {
        *self.reads.lock().unwrap() += 1;
        let rows: Vec<Row> = self
            .sorted_rows(table)?
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .collect();
        Ok(Batch::from_rows(rows, None, limit))
    }

    async fn close(&self) {}
}

/// Destination side.
pub struct MemoryWriter {
    kind: DialectKind,
    pub tables: Arc<Mutex<BTreeMap<String, MemTable>>>,
    pub log: Arc<Mutex<WriterLog>>,
    fail_writes: HashSet<String>,
}

impl MemoryWriter {
    pub fn new(kind: DialectKind) -> Self {
        Self {
            kind,
            tables: Arc::new(Mutex::new(BTreeMap::new())),
            log: Arc::new(Mutex::new(WriterLog::default())),
            fail_writes: HashSet::new(),
        }
    }

    /// Pre-populate the destination, as an interrupted earlier run would.
    pub fn with_table(self, schema: Table, rows: Vec<Row>) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(schema.name.clone(), MemTable { schema, rows });
        self
    }

    /// Every write to `table` fails.
    pub fn failing_on(mut self, table: &str) -> Self {
        self.fail_writes.insert(table.to_string());
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.log
            .lock()
            .unwrap()
            .batches
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TargetWriter for MemoryWriter {
    fn kind(&self) -> DialectKind {
        self.kind
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        self.tables.lock().unwrap().insert(
            table.name.clone(),
            MemTable {
                schema: table.clone(),
                rows: Vec::new(),
            },
        );
        self.log.lock().unwrap().created.push(table.name.clone());
        Ok(())
    }

    async fn create_unique_constraint(&self, _table: &Table, uc: &UniqueConstraint) -> Result<()> {
        self.log.lock().unwrap().constraints.push(uc.name.clone());
        Ok(())
    }

    async fn create_check_constraint(&self, _table: &Table, chk: &CheckConstraint) -> Result<()> {
        self.log.lock().unwrap().constraints.push(chk.name.clone());
        Ok(())
    }

    async fn create_foreign_key(&self, _table: &Table, fk: &ForeignKey) -> Result<()> {
        self.log.lock().unwrap().constraints.push(fk.name.clone());
        Ok(())
    }

    async fn create_index(&self, _table: &Table, idx: &Index) -> Result<()> {
        self.log.lock().unwrap().indexes.push(idx.name.clone());
        Ok(())
    }

    async fn write_batch(&self, table: &Table, batch: Batch) -> Result<u64> {
        if self.fail_writes.contains(&table.name) {
            return Err(MigrateError::transfer(&table.name, "disk full"));
        }
        let len = batch.len();
        let mut tables = self.tables.lock().unwrap();
        let mem = tables
            .get_mut(&table.name)
            .ok_or_else(|| MigrateError::MissingTargetTable(table.name.clone()))?;
        mem.rows.extend(batch.rows);
        self.log
            .lock()
            .unwrap()
            .batches
            .entry(table.name.clone())
            .or_default()
            .push(len);
        Ok(len as u64)
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map_or(0, |t| t.rows.len() as i64))
    }

    async fn get_max_pk(&self, table: &Table) -> Result<Option<PkValue>> {
        let Some(idx) = table.column_index(&table.primary_key[0]) else {
            return Ok(None);
        };
        Ok(self.tables.lock().unwrap().get(&table.name).and_then(|t| {
            t.rows
                .iter()
                .filter_map(|row| PkValue::from_sql_value(&row[idx]))
                .max()
        }))
    }

    async fn close(&self) {}
}

/// `name(id INTEGER PRIMARY KEY, label TEXT)` with ids `1..=rows`.
pub fn simple_table(name: &str, rows: i64) -> MemTable {
    let mut schema = Table::new(name);
    schema.columns = vec![
        Column {
            is_nullable: false,
            ..Column::new("id", "INTEGER")
        },
        Column::new("label", "TEXT"),
    ];
    schema.primary_key = vec!["id".to_string()];
    MemTable {
        schema,
        rows: (1..=rows).map(simple_row).collect(),
    }
}

pub fn simple_row(id: i64) -> Row {
    vec![
        SqlValue::I64(id),
        SqlValue::Text(format!("row {}", id).into()),
    ]
}

/// `name(id INTEGER PRIMARY KEY, {ref}_id INTEGER REFERENCES ref(id))`.
pub fn child_table(name: &str, parent: &str, rows: i64) -> MemTable {
    let fk_col = format!("{}_id", parent);
    let mut schema = Table::new(name);
    schema.columns = vec![
        Column {
            is_nullable: false,
            ..Column::new("id", "INTEGER")
        },
        Column::new(fk_col.clone(), "INTEGER"),
    ];
    schema.primary_key = vec!["id".to_string()];
    schema.foreign_keys = vec![ForeignKey {
        name: format!("fk_{}_{}", name, parent),
        columns: vec![fk_col],
        ref_table: parent.to_string(),
        ref_columns: vec!["id".to_string()],
        on_delete: None,
        on_update: None,
    }];
    MemTable {
        schema,
        rows: (1..=rows)
            .map(|i| vec![SqlValue::I64(i), SqlValue::I64(i)])
            .collect(),
    }
}

/// `name(a INTEGER, b INTEGER, PRIMARY KEY (a, b))`.
pub fn composite_table(name: &str, rows: i64) -> MemTable {
    let mut schema = Table::new(name);
    schema.columns = vec![
        Column {
            is_nullable: false,
            ..Column::new("a", "INTEGER")
        },
        Column {
            is_nullable: false,
            ..Column::new("b", "INTEGER")
        },
    ];
    schema.primary_key = vec!["a".to_string(), "b".to_string()];
    MemTable {
        schema,
        rows: (0..rows)
            .map(|i| vec![SqlValue::I64(i / 3), SqlValue::I64(i % 3)])
            .collect(),
    }
}
