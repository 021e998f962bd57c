//! Partition reconciler: clears stale partitions before a fresh write.
//!
//! Only dates present in the new batch are touched. The provider may revise
//! recent bars, so a re-fetched date must be replaced, never appended to.
//!
//! A crash between this step and the write leaves those dates missing until
//! the next successful run. `CommitMode::Staged` narrows that window.

use super::partition::PartitionKey;
use super::{PartitionStore, StoreError};
use crate::domain::Batch;
use chrono::NaiveDate;

/// Delete every existing partition whose date appears in `batch`.
///
/// Returns the dates actually cleared, ascending. The first failure aborts.
pub fn reconcile(batch: &Batch, store: &dyn PartitionStore) -> Result<Vec<NaiveDate>, StoreError> {
    log::info!("Checking for existing partitions in {} to overwrite...", store.root());

    let mut cleared = Vec::new();
    for date in batch.partition_keys() {
        let key = PartitionKey::new(date);
        if store.exists(key)? {
            log::info!("  - Partition {key} found. Deleting.");
            store.remove_partition(key)?;
            cleared.push(date);
        } else {
            log::info!("  - Partition {key} not found. A new one will be created.");
        }
    }
    Ok(cleared)
}
