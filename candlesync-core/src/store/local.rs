//! Local-filesystem partition store with Hive-style `date=` directories.
//!
//! Layout: `{root}/date={YYYY-MM-DD}/part-0.parquet` and `_meta.json`.
//!
//! - Parquet files are written to `.tmp` and renamed into place
//! - Staged partitions live under `{root}/.staging/{id}/` until promoted
//! - Integrity validation on read (schema check)
//! - Metadata sidecar per partition (row count, symbols, content hash)

use super::partition::PartitionKey;
use super::schema::CandleSchema;
use super::writer::PartitionWrite;
use super::{PartitionStore, StoreError, StoredCandle};
use crate::domain::CandleRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DATA_FILE: &str = "part-0.parquet";
const META_FILE: &str = "_meta.json";
const STAGING_DIR: &str = ".staging";

/// Metadata sidecar for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub date: NaiveDate,
    pub row_count: usize,
    pub symbols: Vec<String>,
    pub data_hash: String,
    pub fetched_at: NaiveDateTime,
    pub written_at: NaiveDateTime,
}

/// Partition store rooted at a local directory.
pub struct LocalPartitionStore {
    root: PathBuf,
}

impl LocalPartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the dataset.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Directory for a partition: `{root}/date={YYYY-MM-DD}/`
    pub fn partition_dir(&self, key: PartitionKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    fn staging_dir(&self, staging_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(staging_id)
    }

    /// Read a partition's metadata sidecar, if present and parseable.
    pub fn partition_meta(&self, key: PartitionKey) -> Option<PartitionMeta> {
        let content = fs::read_to_string(self.partition_dir(key).join(META_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_into(
        &self,
        dir: &Path,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError> {
        let write_err = |message: String| StoreError::Write {
            root: self.root(),
            key,
            message,
        };

        if let Some(r) = records.iter().find(|r| r.date != key.date()) {
            return Err(write_err(format!(
                "record for {} {} does not belong to this partition",
                r.symbol, r.date
            )));
        }
        if records.is_empty() {
            return Err(write_err("no records to write".into()));
        }

        fs::create_dir_all(dir).map_err(|e| write_err(format!("create dir: {e}")))?;

        let df = records_to_dataframe(records).map_err(|e| write_err(format!("dataframe: {e}")))?;
        let path = dir.join(DATA_FILE);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&df, &tmp_path).map_err(write_err)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("atomic rename failed: {e}"))
        })?;

        let rows: Vec<StoredCandle> = records.iter().map(|r| StoredCandle::from(*r)).collect();
        let meta = PartitionMeta {
            date: key.date(),
            row_count: rows.len(),
            symbols: records
                .iter()
                .map(|r| r.symbol.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            data_hash: blake3::hash(
                &serde_json::to_vec(&rows).map_err(|e| write_err(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            fetched_at: records[0].fetched_at,
            written_at: chrono::Utc::now().naive_utc(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| write_err(format!("meta serialization: {e}")))?;
        fs::write(dir.join(META_FILE), meta_json).map_err(|e| write_err(format!("meta write: {e}")))?;

        Ok(PartitionWrite {
            key,
            rows: records.len(),
            path: dir.display().to_string(),
        })
    }
}

impl PartitionStore for LocalPartitionStore {
    fn root(&self) -> String {
        self.root.display().to_string()
    }

    fn exists(&self, key: PartitionKey) -> Result<bool, StoreError> {
        self.partition_dir(key)
            .try_exists()
            .map_err(|e| StoreError::Check {
                root: self.root(),
                key,
                message: e.to_string(),
            })
    }

    fn remove_partition(&self, key: PartitionKey) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.partition_dir(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Delete {
                root: self.root(),
                key,
                message: e.to_string(),
            }),
        }
    }

    fn write_partition(
        &self,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError> {
        self.write_into(&self.partition_dir(key), key, records)
    }

    fn list_partitions(&self) -> Result<Vec<PartitionKey>, StoreError> {
        let list_err = |e: std::io::Error| StoreError::List {
            root: self.root(),
            message: e.to_string(),
        };

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_err(e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(list_err)?;
            if !entry.file_type().map_err(list_err)?.is_dir() {
                continue;
            }
            if let Some(key) = PartitionKey::from_dir_name(&entry.file_name().to_string_lossy()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read_partition(&self, key: PartitionKey) -> Result<Vec<StoredCandle>, StoreError> {
        let dir = self.partition_dir(key);
        if !dir.is_dir() {
            return Err(StoreError::NotFound {
                root: self.root(),
                key,
            });
        }
        let read_err = |message: String| StoreError::Read {
            root: self.root(),
            key,
            message,
        };

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| read_err(format!("read dir: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            // Skip the sidecar and leftover .tmp files
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .collect();
        files.sort();

        let mut rows = Vec::new();
        for path in files {
            let df = read_parquet(&path).map_err(&read_err)?;
            CandleSchema::validate(&df).map_err(|e| read_err(format!("{}: {e}", path.display())))?;
            rows.extend(dataframe_to_rows(&df, key.date()).map_err(&read_err)?);
        }
        Ok(rows)
    }

    fn stage_partition(
        &self,
        staging_id: &str,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError> {
        let dir = self.staging_dir(staging_id).join(key.dir_name());
        self.write_into(&dir, key, records)
    }

    fn promote_staged(&self, staging_id: &str, key: PartitionKey) -> Result<(), StoreError> {
        let staged = self.staging_dir(staging_id).join(key.dir_name());
        if !staged.is_dir() {
            return Err(StoreError::NotFound {
                root: format!("{}/{STAGING_DIR}/{staging_id}", self.root()),
                key,
            });
        }

        let live = self.partition_dir(key);
        let promote_err = |message: String| StoreError::Promote {
            root: self.root(),
            key,
            message,
        };
        match fs::remove_dir_all(&live) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(promote_err(format!("remove old partition: {e}"))),
        }
        fs::rename(&staged, &live).map_err(|e| promote_err(format!("rename: {e}")))
    }

    fn discard_staging(&self, staging_id: &str) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.staging_dir(staging_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::Discard {
                    root: self.root(),
                    staging_id: staging_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
        // Only succeeds when no other staging area is left
        let _ = fs::remove_dir(self.root.join(STAGING_DIR));
        Ok(())
    }

    fn staging_location(&self, staging_id: &str) -> String {
        self.staging_dir(staging_id).display().to_string()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert records of one partition to a DataFrame in file-schema order.
fn records_to_dataframe(records: &[&CandleRecord]) -> PolarsResult<DataFrame> {
    let symbols: Vec<&str> = records.iter().map(|r| r.symbol.as_str()).collect();
    let opens: Vec<f64> = records.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = records.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = records.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = records.iter().map(|r| r.volume).collect();
    let datetimes: Vec<i64> = records
        .iter()
        .map(|r| r.datetime.and_utc().timestamp_millis())
        .collect();
    let timestamps: Vec<i64> = records.iter().map(|r| r.raw_timestamp).collect();

    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("datetime".into(), datetimes)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        Column::new("timestamp".into(), timestamps),
    ])
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), String> {
    let file = fs::File::create(path).map_err(|e| format!("create file: {e}"))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| format!("write parquet: {e}"))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, String> {
    let file = fs::File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| format!("read {}: {e}", path.display()))
}

/// Convert a partition file back to rows, restoring `date` from the key.
fn dataframe_to_rows(df: &DataFrame, date: NaiveDate) -> Result<Vec<StoredCandle>, String> {
    let col = |name: &str| df.column(name).map_err(|e| format!("column {name}: {e}"));
    let type_err = |name: &str, e: PolarsError| format!("{name} column type: {e}");

    let symbol_ca = col("symbol")?.str().map_err(|e| type_err("symbol", e))?;
    let open_ca = col("open")?.f64().map_err(|e| type_err("open", e))?;
    let high_ca = col("high")?.f64().map_err(|e| type_err("high", e))?;
    let low_ca = col("low")?.f64().map_err(|e| type_err("low", e))?;
    let close_ca = col("close")?.f64().map_err(|e| type_err("close", e))?;
    let vol_ca = col("volume")?.u64().map_err(|e| type_err("volume", e))?;
    let dt_ca = col("datetime")?.datetime().map_err(|e| type_err("datetime", e))?;
    let ts_ca = col("timestamp")?.i64().map_err(|e| type_err("timestamp", e))?;

    let null = |name: &str, i: usize| format!("null {name} at row {i}");

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let millis = dt_ca.get(i).ok_or_else(|| null("datetime", i))?;
        let datetime = DateTime::from_timestamp_millis(millis)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| format!("invalid datetime {millis} at row {i}"))?;

        rows.push(StoredCandle {
            date,
            symbol: symbol_ca.get(i).ok_or_else(|| null("symbol", i))?.to_string(),
            open: open_ca.get(i).ok_or_else(|| null("open", i))?,
            high: high_ca.get(i).ok_or_else(|| null("high", i))?,
            low: low_ca.get(i).ok_or_else(|| null("low", i))?,
            close: close_ca.get(i).ok_or_else(|| null("close", i))?,
            volume: vol_ca.get(i).ok_or_else(|| null("volume", i))?,
            datetime,
            timestamp: ts_ca.get(i).ok_or_else(|| null("timestamp", i))?,
        });
    }

    Ok(rows)
}
