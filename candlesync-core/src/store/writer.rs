//! Partitioned writer: one Parquet file set per distinct date in the batch.
//!
//! There is no multi-partition transaction. If partition N fails, partitions
//! 0..N stay committed and the error names the failing partition.

use super::partition::PartitionKey;
use super::{PartitionStore, StoreError};
use crate::domain::Batch;
use serde::Serialize;

/// One partition written by this run. `path` is the partition directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionWrite {
    pub key: PartitionKey,
    pub rows: usize,
    pub path: String,
}

/// Everything a write pass committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub partitions: Vec<PartitionWrite>,
}

impl WriteReport {
    pub fn rows(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }
}

/// Write every partition of `batch` into the live dataset, ascending by date.
pub fn write(batch: &Batch, store: &dyn PartitionStore) -> Result<WriteReport, StoreError> {
    log::info!(
        "Exporting {} rows to {} partitioned by 'date'...",
        batch.len(),
        store.root()
    );
    let mut report = WriteReport::default();
    for date in batch.partition_keys() {
        let key = PartitionKey::new(date);
        let records = batch.partition(date);
        let written = store.write_partition(key, &records).map_err(|e| {
            log::error!(
                "Export to {} failed at {key} after {} committed partition(s): {e}",
                store.root(),
                report.partitions.len()
            );
            e
        })?;
        log::debug!("  - wrote {} rows to {}", written.rows, written.path);
        report.partitions.push(written);
    }
    log::info!(
        "Export successful: {} rows in {} partition(s)",
        report.rows(),
        report.partitions.len()
    );
    Ok(report)
}

/// Write every partition of `batch` into staging area `staging_id`.
///
/// Nothing becomes visible to readers until each partition is promoted.
pub fn stage(
    batch: &Batch,
    store: &dyn PartitionStore,
    staging_id: &str,
) -> Result<WriteReport, StoreError> {
    let mut report = WriteReport::default();
    for date in batch.partition_keys() {
        let key = PartitionKey::new(date);
        let records = batch.partition(date);
        report
            .partitions
            .push(store.stage_partition(staging_id, key, &records)?);
    }
    log::info!(
        "Staged {} rows in {} partition(s) under {} ({staging_id})",
        report.rows(),
        report.partitions.len(),
        store.root()
    );
    Ok(report)
}
