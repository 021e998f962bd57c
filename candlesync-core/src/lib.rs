//! candlesync core: daily candle ingestion into a date-partitioned Parquet store.
//!
//! This crate contains the whole sync job:
//! - Domain types (tickers, date ranges, raw and canonical candles, batches)
//! - Access-token acquisition from a stored refresh credential
//! - Fyers history client and the throttled multi-ticker fetch loop
//! - Batch normalization with a per-run fetch timestamp
//! - Partition store, reconciler (delete-before-write) and partitioned writer
//! - The pipeline tying them together, and its TOML configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod pipeline;
pub mod store;

pub use config::{ConfigError, SyncConfig};
pub use pipeline::{run_pipeline, CommitMode, PipelineContext, PipelineError, RunOutcome, RunReport};
