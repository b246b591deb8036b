//! Resumable chunked copy of one table.
//!
//! The engine never persists progress. Every job starts by comparing the
//! origin and destination row counts and derives its [`CopyCursor`] from
//! what the destination already holds:
//!
//! - equal counts: nothing to do, the table is skipped;
//! - single-column key: keyset pages `key > cursor`, resuming after the
//!   destination's largest key;
//! - composite key: `ORDER BY` every key column with `OFFSET`, starting at
//!   the destination's row count.
//!
//! Chunks within a table are strictly sequential and each chunk is written
//! in its own transaction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::schema::{PkValue, Table};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};

/// Where a table copy starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyCursor {
    /// Destination is empty.
    Fresh,
    /// Continue after this key (single-column keys).
    ResumeFrom(PkValue),
    /// Skip this many rows in key order (composite keys).
    Offset(i64),
}

impl CopyCursor {
    /// Cursor for a table whose destination holds `dest_count` rows.
    ///
    /// `max_key` is the destination's largest key, only consulted for
    /// single-column keys.
    pub fn initial(single_key: bool, dest_count: i64, max_key: Option<PkValue>) -> Self {
        if dest_count <= 0 {
            return CopyCursor::Fresh;
        }
        if single_key {
            max_key.map_or(CopyCursor::Fresh, CopyCursor::ResumeFrom)
        } else {
            CopyCursor::Offset(dest_count)
        }
    }
}

/// How a table job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    /// Rows were copied until the origin was exhausted.
    Completed,
    /// Row counts already matched; nothing was read or written.
    Skipped,
}

/// Statistics from a transfer job.
#[derive(Debug, Clone, Serialize)]
pub struct TransferStats {
    /// Rows written to the destination.
    pub rows: u64,

    /// Chunks written.
    pub batches: u64,

    /// How the job ended.
    pub outcome: CopyOutcome,

    /// Wall time of the job.
    #[serde(skip)]
    pub duration: Duration,
}

impl TransferStats {
    fn skipped(duration: Duration) -> Self {
        Self {
            rows: 0,
            batches: 0,
            outcome: CopyOutcome::Skipped,
            duration,
        }
    }
}

/// Transfer job for a single table.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Origin descriptor, used for reads.
    pub source: Table,
    /// Destination descriptor, used for writes.
    pub target: Table,
}

/// Copies tables from one reader to one writer.
#[derive(Clone)]
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    chunk_size: usize,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        chunk_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Copy every row of the job's table not yet present in the destination.
    pub async fn execute(&self, job: &TransferJob) -> Result<TransferStats> {
        let start = Instant::now();
        let src = &job.source;
        let tgt = &job.target;

        if !self.target.table_exists(&tgt.name).await? {
            return Err(MigrateError::MissingTargetTable(tgt.name.clone()));
        }

        let origin_count = self.source.get_row_count(&src.name).await?;
        let dest_count = self.target.get_row_count(&tgt.name).await?;
        if origin_count == dest_count {
            info!(
                "{} table already filled ({} rows), skipping",
                src.name, dest_count
            );
            return Ok(TransferStats::skipped(start.elapsed()));
        }

        let max_key = if src.has_single_pk() && dest_count > 0 {
            self.target.get_max_pk(tgt).await?
        } else {
            None
        };
        let cursor = CopyCursor::initial(src.has_single_pk(), dest_count, max_key);

        info!("Migrating {} table", src.name);
        debug!(
            "{}: origin={} destination={} cursor={:?}",
            src.name, origin_count, dest_count, cursor
        );

        let (rows, batches) = if src.has_single_pk() {
            self.copy_by_key(src, tgt, cursor).await?
        } else {
            self.copy_by_offset(src, tgt, cursor, origin_count).await?
        };

        info!("{} table filled", src.name);
        Ok(TransferStats {
            rows,
            batches,
            outcome: CopyOutcome::Completed,
            duration: start.elapsed(),
        })
    }

    /// Keyset pagination; stops on the first empty page.
    async fn copy_by_key(&self, src: &Table, tgt: &Table, cursor: CopyCursor) -> Result<(u64, u64)> {
        let mut after = match cursor {
            CopyCursor::ResumeFrom(key) => Some(key),
            _ => None,
        };
        let (mut rows, mut batches) = (0u64, 0u64);

        loop {
            let batch = self
                .source
                .read_after_key(src, after.as_ref(), self.chunk_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let next = batch.last_key.clone().ok_or_else(|| {
                MigrateError::transfer(&src.name, "could not read the key of the last row")
            })?;
            // String keys follow the database collation, so only integers are checked
            if let (Some(PkValue::Int(prev)), PkValue::Int(last)) = (&after, &next) {
                if last <= prev {
                    return Err(MigrateError::transfer(
                        &src.name,
                        format!("key did not advance past {}", prev),
                    ));
                }
            }

            let len = batch.len();
            rows += self.target.write_batch(tgt, batch).await?;
            batches += 1;
            debug!("{}: wrote {} rows up to key {}", src.name, len, next);
            after = Some(next);
        }

        Ok((rows, batches))
    }

    /// Offset pagination over the full key; stops at the origin row count
    /// or on an empty page.
    async fn copy_by_offset(
        &self,
        src: &Table,
        tgt: &Table,
        cursor: CopyCursor,
        origin_count: i64,
    ) -> Result<(u64, u64)> {
        let mut offset = match cursor {
            CopyCursor::Offset(n) => n,
            _ => 0,
        };
        let (mut rows, mut batches) = (0u64, 0u64);

        while offset < origin_count {
            let batch = self
                .source
                .read_at_offset(src, offset, self.chunk_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            let len = batch.len();
            rows += self.target.write_batch(tgt, batch).await?;
            batches += 1;
            debug!("{}: wrote {} rows at offset {}", src.name, len, offset);
            offset += self.chunk_size as i64;
        }

        Ok((rows, batches))
    }
}
