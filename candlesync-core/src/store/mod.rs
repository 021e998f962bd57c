//! Date-partitioned candle store.
//!
//! Layout: `{root}/date={YYYY-MM-DD}/part-0.parquet` plus a `_meta.json`
//! sidecar per partition. The `date` column is carried by the directory name
//! only, following the `key=value` convention of Hive-style datasets.

pub mod local;
pub mod partition;
pub mod reconcile;
pub mod schema;
pub mod writer;

pub use local::{LocalPartitionStore, PartitionMeta};
pub use partition::PartitionKey;
pub use reconcile::reconcile;
pub use schema::{CandleSchema, SchemaError};
pub use writer::{stage, write, PartitionWrite, WriteReport};

use crate::domain::CandleRecord;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage failures. Every variant names the store root and the partition.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to check partition {key} under {root}: {message}")]
    Check {
        root: String,
        key: PartitionKey,
        message: String,
    },

    #[error("failed to delete partition {key} under {root}: {message}")]
    Delete {
        root: String,
        key: PartitionKey,
        message: String,
    },

    #[error("failed to write partition {key} under {root}: {message}")]
    Write {
        root: String,
        key: PartitionKey,
        message: String,
    },

    #[error("failed to read partition {key} under {root}: {message}")]
    Read {
        root: String,
        key: PartitionKey,
        message: String,
    },

    #[error("failed to list partitions under {root}: {message}")]
    List { root: String, message: String },

    #[error("failed to commit staged partition {key} under {root}: {message}")]
    Promote {
        root: String,
        key: PartitionKey,
        message: String,
    },

    #[error("failed to discard staging area {staging_id} under {root}: {message}")]
    Discard {
        root: String,
        staging_id: String,
        message: String,
    },

    #[error("no partition {key} under {root}")]
    NotFound { root: String, key: PartitionKey },
}

/// One row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCandle {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub datetime: NaiveDateTime,
    pub timestamp: i64,
}

impl From<&CandleRecord> for StoredCandle {
    fn from(r: &CandleRecord) -> Self {
        Self {
            date: r.date,
            symbol: r.symbol.to_string(),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            datetime: r.datetime,
            timestamp: r.raw_timestamp,
        }
    }
}

/// Destination for partitioned candle data.
///
/// Partitions are created whole, removed whole, and never updated in place.
/// Staging lets a run write everything first and swap partitions in afterwards.
pub trait PartitionStore {
    /// Human-readable location, used in logs and errors.
    fn root(&self) -> String;

    fn exists(&self, key: PartitionKey) -> Result<bool, StoreError>;

    /// Remove a partition and everything beneath it.
    fn remove_partition(&self, key: PartitionKey) -> Result<(), StoreError>;

    /// Write `records` (all with `date == key.date()`) as the partition's data.
    fn write_partition(
        &self,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError>;

    /// All partitions present, ascending.
    fn list_partitions(&self) -> Result<Vec<PartitionKey>, StoreError>;

    fn read_partition(&self, key: PartitionKey) -> Result<Vec<StoredCandle>, StoreError>;

    /// Write a partition into the staging area `staging_id`, invisible to readers.
    fn stage_partition(
        &self,
        staging_id: &str,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError>;

    /// Replace the live partition with the staged one.
    fn promote_staged(&self, staging_id: &str, key: PartitionKey) -> Result<(), StoreError>;

    /// Drop whatever is left in the staging area.
    fn discard_staging(&self, staging_id: &str) -> Result<(), StoreError>;

    /// Where staging area `staging_id` lives, for operators cleaning up by hand.
    fn staging_location(&self, staging_id: &str) -> String;
}
